// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Sum-of-Exponentials Memory Kernel
// ─────────────────────────────────────────────────────────────────────
//! Approximates the power-law memory kernel
//!
//!   K_α(τ) = τ^(1−2α) / Γ(2−2α)  ≈  Σ_r w_r · exp(−s_r · τ)
//!
//! over a lag window [τ_min, τ_max].
//!
//! For β = 2α − 1 ≥ 0.2 the kernel is a completely monotone power law and
//! the weights come from a log-spaced quadrature of
//!
//!   τ^(−β) = (1/Γ(β)) ∫₀^∞ s^(β−1) e^(−sτ) ds.
//!
//! Below that the kernel decays too slowly for the truncated quadrature
//! (or, for α ≤ ½, not at all); weights are then the relative-error
//! least-squares fit on log-spaced rates, solved by a
//! Tikhonov-regularised Cholesky factorisation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use igsoa_types::{GwError, GwResult, SolverConfig};

use crate::special::{fractional_kernel, recip_gamma};

/// Relative truncation allowed at the long-lag end of the quadrature.
const LOW_RATE_TAIL: f64 = 0.01;
/// exp(−40) at the shortest lag.
const HIGH_RATE_DECADES: f64 = 40.0;
/// Below this β the quadrature's truncated low-rate tail dominates;
/// such orders use the least-squares fit.
const QUADRATURE_MIN_BETA: f64 = 0.2;
const LSQ_OVERSAMPLE: usize = 8;
const LSQ_RIDGE: f64 = 1e-10;

pub fn check_order(alpha: f64) -> GwResult<()> {
    if alpha > 0.0 && alpha <= 2.0 {
        Ok(())
    } else {
        Err(GwError::InvalidOrder { alpha })
    }
}

fn log_space(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![(lo * hi).sqrt()];
    }
    let (a, b) = (lo.ln(), hi.ln());
    let h = (b - a) / (n - 1) as f64;
    (0..n).map(|i| (a + h * i as f64).exp()).collect()
}

/// Fitted exponential expansion of one memory kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoeKernel {
    pub alpha: f64,
    pub weights: Vec<f64>,
    pub rates: Vec<f64>,
    pub tau_min: f64,
    pub tau_max: f64,
}

/// Accuracy of a fitted kernel against the analytic power law.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KernelFitReport {
    pub alpha: f64,
    pub rank: usize,
    pub max_rel_error: f64,
    pub mean_rel_error: f64,
    pub rms_rel_error: f64,
    pub samples: usize,
}

impl SoeKernel {
    /// Fit a rank-`rank` expansion of K_α on `[tau_min, tau_max]`.
    pub fn fit(alpha: f64, rank: usize, tau_min: f64, tau_max: f64) -> GwResult<Self> {
        check_order(alpha)?;
        if rank == 0 {
            return Err(GwError::config("rank", rank, ">= 1"));
        }
        if !(tau_min > 0.0 && tau_max > tau_min && tau_max.is_finite()) {
            return Err(GwError::config(
                "tau window",
                format!("[{tau_min}, {tau_max}]"),
                "0 < tau_min < tau_max < inf",
            ));
        }

        let scale = recip_gamma(2.0 - 2.0 * alpha);
        let beta = 2.0 * alpha - 1.0;

        let (weights, rates) = if scale == 0.0 {
            // Γ(2−2α) has a pole: the kernel vanishes identically.
            let rates = log_space(1.0 / tau_max, 1.0 / tau_min, rank);
            (vec![0.0; rank], rates)
        } else if beta >= QUADRATURE_MIN_BETA {
            quadrature_fit(scale, beta, rank, tau_min, tau_max)
        } else {
            least_squares_fit(alpha, rank, tau_min, tau_max)?
        };

        if weights.iter().chain(&rates).any(|v| !v.is_finite()) {
            return Err(GwError::Numerical(format!(
                "non-finite kernel fit for alpha = {alpha}, rank = {rank}"
            )));
        }

        Ok(Self {
            alpha,
            weights,
            rates,
            tau_min,
            tau_max,
        })
    }

    /// Rebuild a kernel from externally cached coefficients.
    pub fn from_parts(
        alpha: f64,
        weights: Vec<f64>,
        rates: Vec<f64>,
        tau_min: f64,
        tau_max: f64,
    ) -> GwResult<Self> {
        check_order(alpha)?;
        if weights.len() != rates.len() {
            return Err(GwError::shape("kernel rates", weights.len(), rates.len()));
        }
        if weights.is_empty() {
            return Err(GwError::config("rank", 0, ">= 1"));
        }
        if rates.iter().any(|&s| !(s > 0.0 && s.is_finite())) {
            return Err(GwError::Numerical(
                "kernel rates must be finite and positive".into(),
            ));
        }
        Ok(Self {
            alpha,
            weights,
            rates,
            tau_min,
            tau_max,
        })
    }

    pub fn rank(&self) -> usize {
        self.weights.len()
    }

    /// True when every weight is zero (memory-free order).
    pub fn is_zero(&self) -> bool {
        self.weights.iter().all(|&w| w == 0.0)
    }

    /// Σ w_r·exp(−s_r·τ).
    pub fn evaluate(&self, tau: f64) -> f64 {
        self.weights
            .iter()
            .zip(&self.rates)
            .map(|(w, s)| w * (-s * tau).exp())
            .sum()
    }

    /// Σ w_r·(1 − e^(−s_r·dt))/s_r: history response to one step of
    /// unit forcing.
    pub fn step_gain(&self, dt: f64) -> f64 {
        self.weights
            .iter()
            .zip(&self.rates)
            .map(|(w, s)| w * -(-s * dt).exp_m1() / s)
            .sum()
    }

    /// |step_gain(dt)| / dt. The explicit field step feeds the memory
    /// term back through a second difference; it stays bounded for
    /// values up to 0.5.
    pub fn stability_number(&self, dt: f64) -> f64 {
        self.step_gain(dt).abs() / dt
    }

    /// Compare against the analytic kernel on `samples` log-spaced lags.
    pub fn validate(&self, samples: usize) -> KernelFitReport {
        let taus = log_space(self.tau_min, self.tau_max, samples.max(2));
        let mut max_err: f64 = 0.0;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut counted = 0usize;
        for &tau in &taus {
            let exact = fractional_kernel(self.alpha, tau);
            let approx = self.evaluate(tau);
            let err = if exact == 0.0 {
                approx.abs()
            } else {
                ((approx - exact) / exact).abs()
            };
            max_err = max_err.max(err);
            sum += err;
            sum_sq += err * err;
            counted += 1;
        }
        let n = counted.max(1) as f64;
        KernelFitReport {
            alpha: self.alpha,
            rank: self.rank(),
            max_rel_error: max_err,
            mean_rel_error: sum / n,
            rms_rel_error: (sum_sq / n).sqrt(),
            samples: counted,
        }
    }
}

/// Rectangle rule for the Laplace representation on x = ln s.
fn quadrature_fit(
    scale: f64,
    beta: f64,
    rank: usize,
    tau_min: f64,
    tau_max: f64,
) -> (Vec<f64>, Vec<f64>) {
    let s_lo = LOW_RATE_TAIL.powf(1.0 / beta).max(1e-8) / tau_max;
    let s_hi = (HIGH_RATE_DECADES + beta) / tau_min;
    let (x_lo, x_hi) = (s_lo.ln(), s_hi.ln());
    let h = if rank == 1 {
        x_hi - x_lo
    } else {
        (x_hi - x_lo) / (rank - 1) as f64
    };
    let rates = log_space(s_lo, s_hi, rank);
    let c = scale * recip_gamma(beta) * h;
    let weights = rates.iter().map(|&s| c * s.powf(beta)).collect();
    (weights, rates)
}

/// Relative-error least squares for non-decaying or slowly decaying
/// kernels (β < 0.2).
fn least_squares_fit(
    alpha: f64,
    rank: usize,
    tau_min: f64,
    tau_max: f64,
) -> GwResult<(Vec<f64>, Vec<f64>)> {
    let rates = log_space(0.1 / tau_max, 10.0 / tau_min, rank);
    let taus = log_space(tau_min, tau_max, LSQ_OVERSAMPLE * rank);

    // Normal equations of min Σ_m (Σ_r A_mr w_r − 1)², A_mr = e^(−s_r τ_m)/K(τ_m).
    let mut ata = vec![0.0; rank * rank];
    let mut atb = vec![0.0; rank];
    let mut row = vec![0.0; rank];
    for &tau in &taus {
        let k = fractional_kernel(alpha, tau);
        for (r, &s) in rates.iter().enumerate() {
            row[r] = (-s * tau).exp() / k;
        }
        for a in 0..rank {
            atb[a] += row[a];
            for b in 0..=a {
                ata[a * rank + b] += row[a] * row[b];
            }
        }
    }
    let trace: f64 = (0..rank).map(|a| ata[a * rank + a]).sum();
    let mu = LSQ_RIDGE * trace / rank as f64;
    for a in 0..rank {
        ata[a * rank + a] += mu;
    }

    let weights = cholesky_solve(&mut ata, &atb, rank)?;
    Ok((weights, rates))
}

/// Solve S·x = b for symmetric positive-definite S (lower triangle used).
fn cholesky_solve(s: &mut [f64], b: &[f64], n: usize) -> GwResult<Vec<f64>> {
    for j in 0..n {
        let mut d = s[j * n + j];
        for k in 0..j {
            d -= s[j * n + k] * s[j * n + k];
        }
        if d <= 0.0 || !d.is_finite() {
            return Err(GwError::Numerical(format!(
                "kernel normal equations not positive definite at column {j}"
            )));
        }
        let d = d.sqrt();
        s[j * n + j] = d;
        for i in (j + 1)..n {
            let mut v = s[i * n + j];
            for k in 0..j {
                v -= s[i * n + k] * s[j * n + k];
            }
            s[i * n + j] = v / d;
        }
    }
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= s[i * n + k] * y[k];
        }
        y[i] = v / s[i * n + i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut v = y[i];
        for k in (i + 1)..n {
            v -= s[k * n + i] * x[k];
        }
        x[i] = v / s[i * n + i];
    }
    Ok(x)
}

struct TableInner {
    /// Sorted by α.
    kernels: Vec<Arc<SoeKernel>>,
    /// Requests within this distance of a cached α reuse it.
    snap_tolerance: f64,
}

/// Shared cache of fitted kernels keyed by memory order.
///
/// Kernels are immutable once inserted and handed out as `Arc`s, so
/// readers never block each other after warm-up.
pub struct KernelTable {
    rank: usize,
    tau_min: f64,
    tau_max: f64,
    inner: RwLock<TableInner>,
}

impl KernelTable {
    pub fn new(rank: usize, tau_min: f64, tau_max: f64) -> GwResult<Self> {
        if rank == 0 {
            return Err(GwError::config("rank", rank, ">= 1"));
        }
        if !(tau_min > 0.0 && tau_max > tau_min && tau_max.is_finite()) {
            return Err(GwError::config(
                "tau window",
                format!("[{tau_min}, {tau_max}]"),
                "0 < tau_min < tau_max < inf",
            ));
        }
        Ok(Self {
            rank,
            tau_min,
            tau_max,
            inner: RwLock::new(TableInner {
                kernels: Vec::new(),
                snap_tolerance: 0.0,
            }),
        })
    }

    pub fn from_config(solver: &SolverConfig, dt: f64) -> GwResult<Self> {
        solver.validate()?;
        let (lo, hi) = solver.fit_window(dt);
        Self::new(solver.rank, lo, hi)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn window(&self) -> (f64, f64) {
        (self.tau_min, self.tau_max)
    }

    pub fn len(&self) -> usize {
        self.inner.read().kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached orders, ascending.
    pub fn alphas(&self) -> Vec<f64> {
        self.inner.read().kernels.iter().map(|k| k.alpha).collect()
    }

    fn nearest(kernels: &[Arc<SoeKernel>], alpha: f64) -> Option<(usize, f64)> {
        let pos = kernels.partition_point(|k| k.alpha < alpha);
        [pos.checked_sub(1), Some(pos)]
            .into_iter()
            .flatten()
            .filter(|&i| i < kernels.len())
            .map(|i| (i, (kernels[i].alpha - alpha).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn insert(inner: &mut TableInner, kernel: Arc<SoeKernel>) {
        let pos = inner.kernels.partition_point(|k| k.alpha < kernel.alpha);
        if pos < inner.kernels.len() && inner.kernels[pos].alpha == kernel.alpha {
            inner.kernels[pos] = kernel;
        } else {
            inner.kernels.insert(pos, kernel);
        }
    }

    /// Fit and cache every order not already present. Fits run in parallel.
    pub fn precompute(&self, alphas: &[f64]) -> GwResult<()> {
        for &a in alphas {
            check_order(a)?;
        }
        let missing: Vec<f64> = {
            let inner = self.inner.read();
            let mut seen: HashMap<u64, ()> = HashMap::new();
            alphas
                .iter()
                .copied()
                .filter(|a| {
                    !inner.kernels.iter().any(|k| k.alpha == *a)
                        && seen.insert(a.to_bits(), ()).is_none()
                })
                .collect()
        };
        let fitted: Vec<SoeKernel> = missing
            .par_iter()
            .map(|&a| SoeKernel::fit(a, self.rank, self.tau_min, self.tau_max))
            .collect::<GwResult<_>>()?;

        let mut inner = self.inner.write();
        for k in fitted {
            Self::insert(&mut inner, Arc::new(k));
        }
        log::debug!(
            "kernel table: {} orders cached (rank {}, window [{:e}, {:e}])",
            inner.kernels.len(),
            self.rank,
            self.tau_min,
            self.tau_max
        );
        Ok(())
    }

    /// Precompute `samples` evenly spaced orders on `[lo, hi]`; later
    /// requests snap to the nearest of them.
    pub fn precompute_range(&self, lo: f64, hi: f64, samples: usize) -> GwResult<()> {
        check_order(lo)?;
        check_order(hi)?;
        if lo > hi {
            return Err(GwError::config("alpha range", format!("[{lo}, {hi}]"), "lo <= hi"));
        }
        let n = if lo == hi { 1 } else { samples.max(2) };
        let step = if n > 1 { (hi - lo) / (n - 1) as f64 } else { 0.0 };
        let alphas: Vec<f64> = (0..n)
            .map(|i| if i + 1 == n { hi } else { lo + step * i as f64 })
            .collect();
        self.precompute(&alphas)?;
        let mut inner = self.inner.write();
        inner.snap_tolerance = inner.snap_tolerance.max(0.5 * step);
        Ok(())
    }

    /// Kernel for `alpha`, fitting and caching it if nothing close exists.
    pub fn get(&self, alpha: f64) -> GwResult<Arc<SoeKernel>> {
        check_order(alpha)?;
        {
            let inner = self.inner.read();
            if let Some((i, d)) = Self::nearest(&inner.kernels, alpha) {
                if d <= inner.snap_tolerance.max(1e-12) {
                    return Ok(Arc::clone(&inner.kernels[i]));
                }
            }
        }
        let kernel = Arc::new(SoeKernel::fit(alpha, self.rank, self.tau_min, self.tau_max)?);
        let mut inner = self.inner.write();
        if let Some((i, d)) = Self::nearest(&inner.kernels, alpha) {
            if d <= 1e-12 {
                return Ok(Arc::clone(&inner.kernels[i]));
            }
        }
        Self::insert(&mut inner, Arc::clone(&kernel));
        Ok(kernel)
    }

    /// Insert a kernel produced elsewhere (e.g. loaded from a cache).
    pub fn seed(&self, kernel: SoeKernel) -> GwResult<()> {
        check_order(kernel.alpha)?;
        if kernel.rank() != self.rank {
            return Err(GwError::shape("seeded kernel rank", self.rank, kernel.rank()));
        }
        let mut inner = self.inner.write();
        Self::insert(&mut inner, Arc::new(kernel));
        Ok(())
    }

    /// Approximate K_α(τ).
    pub fn evaluate(&self, alpha: f64, tau: f64) -> GwResult<f64> {
        Ok(self.get(alpha)?.evaluate(tau))
    }

    /// Largest stability number over every cached kernel.
    pub fn max_stability_number(&self, dt: f64) -> f64 {
        self.inner
            .read()
            .kernels
            .iter()
            .map(|k| k.stability_number(dt))
            .fold(0.0, f64::max)
    }

    /// Accuracy report for the kernel serving `alpha`.
    pub fn validate(&self, alpha: f64, samples: usize) -> GwResult<KernelFitReport> {
        Ok(self.get(alpha)?.validate(samples))
    }
}
