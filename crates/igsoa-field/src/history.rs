// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Fractional History Integrator
// ─────────────────────────────────────────────────────────────────────
//! Per-point exponential accumulators for the memory term.
//!
//! Each grid point p keeps R complex accumulators z_{p,r} obeying
//!
//!   dz/dt = −s_r·z + w_r·f''(t)
//!
//! advanced exactly over one step for f'' held constant:
//!
//!   z ← e^(−s_r dt)·z + w_r·f''·(1 − e^(−s_r dt))/s_r
//!
//! The fractional-derivative estimate at p is Σ_r z_{p,r}. Work per step
//! is O(N·R) regardless of elapsed simulated time.

use std::collections::HashMap;
use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;

use igsoa_types::{GridGeometry, GwError, GwResult};

use crate::alloc::{exhausted, guarded_vec, node_count, node_count_u128, required_bytes};
use crate::kernel::{KernelTable, SoeKernel};

/// Per-kernel decay and gain for one timestep.
struct StepFactors {
    decay: Vec<f64>,
    gain: Vec<f64>,
}

impl StepFactors {
    fn new(kernel: &SoeKernel, dt: f64) -> Self {
        let decay = kernel.rates.iter().map(|s| (-s * dt).exp()).collect();
        let gain = kernel
            .weights
            .iter()
            .zip(&kernel.rates)
            .map(|(w, s)| w * -(-s * dt).exp_m1() / s)
            .collect();
        Self { decay, gain }
    }
}

/// History state for every grid point, plus the kernel binding derived
/// from the α field.
pub struct FractionalIntegrator {
    geometry: GridGeometry,
    n_points: usize,
    rank: usize,
    table: Arc<KernelTable>,
    history: Vec<Complex64>,
    derivative: Vec<Complex64>,
    bound_alpha: Vec<f64>,
    palette: Vec<Arc<SoeKernel>>,
    slot: Vec<u32>,
    updates: u64,
}

impl FractionalIntegrator {
    /// Allocate `nx·ny·nz·R` accumulators once; they are never resized.
    pub fn new(geometry: GridGeometry, table: Arc<KernelTable>) -> GwResult<Self> {
        let rank = table.rank();
        let n_points = node_count(&geometry).ok_or_else(|| {
            exhausted(
                "fractional history",
                required_bytes(node_count_u128(&geometry) * rank as u128, 16),
                &geometry,
            )
        })?;
        let len = n_points.checked_mul(rank).ok_or_else(|| {
            exhausted(
                "fractional history",
                required_bytes(n_points as u128 * rank as u128, 16),
                &geometry,
            )
        })?;

        let bytes = required_bytes(len as u128, std::mem::size_of::<Complex64>());
        log::debug!("fractional history: {len} accumulators, {bytes} bytes (rank {rank})");

        let zero = Complex64::new(0.0, 0.0);
        let history = guarded_vec("fractional history", len, zero, &geometry)?;
        let derivative = guarded_vec("fractional derivative", n_points, zero, &geometry)?;
        let slot = guarded_vec("kernel slots", n_points, 0u32, &geometry)?;

        Ok(Self {
            geometry,
            n_points,
            rank,
            table,
            history,
            derivative,
            bound_alpha: Vec::new(),
            palette: Vec::new(),
            slot,
            updates: 0,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn len(&self) -> usize {
        self.n_points
    }

    pub fn is_empty(&self) -> bool {
        self.n_points == 0
    }

    pub fn table(&self) -> &Arc<KernelTable> {
        &self.table
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Distinct kernels currently bound to grid points.
    pub fn bound_kernels(&self) -> usize {
        self.palette.len()
    }

    pub fn memory_usage_bytes(&self) -> usize {
        (self.history.len() + self.derivative.len()) * std::mem::size_of::<Complex64>()
            + self.slot.len() * std::mem::size_of::<u32>()
    }

    /// Resolve a kernel for every point. No-op if `alpha` is unchanged.
    fn bind(&mut self, alpha: &[f64]) -> GwResult<()> {
        if alpha.len() != self.n_points {
            return Err(GwError::shape("alpha field", self.n_points, alpha.len()));
        }
        if !self.palette.is_empty() && self.bound_alpha.as_slice() == alpha {
            return Ok(());
        }

        // Dropped first so a rejected order leaves nothing half-bound.
        self.palette.clear();
        self.bound_alpha.clear();

        let mut by_order: HashMap<u64, u32> = HashMap::new();
        let mut palette: Vec<Arc<SoeKernel>> = Vec::new();
        for (p, &a) in alpha.iter().enumerate() {
            let id = match by_order.get(&a.to_bits()) {
                Some(&id) => id,
                None => {
                    let kernel = self.table.get(a)?;
                    let id = match palette.iter().position(|k| Arc::ptr_eq(k, &kernel)) {
                        Some(existing) => existing as u32,
                        None => {
                            palette.push(kernel);
                            (palette.len() - 1) as u32
                        }
                    };
                    by_order.insert(a.to_bits(), id);
                    id
                }
            };
            self.slot[p] = id;
        }

        log::debug!(
            "fractional history bound {} distinct kernels to {} points",
            palette.len(),
            self.n_points
        );
        self.palette = palette;
        self.bound_alpha.clear();
        self.bound_alpha.extend_from_slice(alpha);
        Ok(())
    }

    /// Advance every accumulator by `dt` with forcing `second_derivative`.
    ///
    /// This is the only operation that changes the history state.
    pub fn update_history(
        &mut self,
        second_derivative: &[Complex64],
        alpha: &[f64],
        dt: f64,
    ) -> GwResult<()> {
        if second_derivative.len() != self.n_points {
            return Err(GwError::shape(
                "second derivative",
                self.n_points,
                second_derivative.len(),
            ));
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(GwError::Numerical(format!("history step dt = {dt}")));
        }
        if !second_derivative
            .par_iter()
            .all(|f| f.re.is_finite() && f.im.is_finite())
        {
            return Err(GwError::Numerical(
                "non-finite second time derivative".into(),
            ));
        }
        self.bind(alpha)?;

        let factors: Vec<StepFactors> = self
            .palette
            .iter()
            .map(|k| StepFactors::new(k, dt))
            .collect();
        let rank = self.rank;
        let slot = &self.slot;

        self.history
            .par_chunks_mut(rank)
            .zip(second_derivative.par_iter())
            .enumerate()
            .for_each(|(p, (z, &f))| {
                let k = &factors[slot[p] as usize];
                for r in 0..rank {
                    z[r] = z[r] * k.decay[r] + f * k.gain[r];
                }
            });
        self.updates += 1;
        Ok(())
    }

    /// Σ_r z_r at every point, from the current history state.
    pub fn compute_derivatives(&mut self, alpha: &[f64]) -> GwResult<&[Complex64]> {
        self.bind(alpha)?;
        let rank = self.rank;
        self.derivative
            .par_iter_mut()
            .zip(self.history.par_chunks(rank))
            .for_each(|(d, z)| *d = z.iter().sum());
        Ok(&self.derivative)
    }

    /// Last computed derivative at flat index `idx`.
    pub fn derivative_at(&self, idx: usize) -> Option<Complex64> {
        self.derivative.get(idx).copied()
    }

    pub fn history_at(&self, idx: usize) -> Option<&[Complex64]> {
        let start = idx.checked_mul(self.rank)?;
        self.history.get(start..start + self.rank)
    }

    /// Zero all accumulators; kernel binding is kept.
    pub fn reset(&mut self) {
        let zero = Complex64::new(0.0, 0.0);
        self.history.iter_mut().for_each(|z| *z = zero);
        self.derivative.iter_mut().for_each(|d| *d = zero);
        self.updates = 0;
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(n: usize) -> GridGeometry {
        GridGeometry {
            nx: n,
            ny: 1,
            nz: 1,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        }
    }

    fn integrator(n: usize, rank: usize) -> FractionalIntegrator {
        let table = Arc::new(KernelTable::new(rank, 1e-3, 1.0).unwrap());
        FractionalIntegrator::new(geometry(n), table).unwrap()
    }

    #[test]
    fn test_allocation_size() {
        let integ = integrator(10, 12);
        assert_eq!(integ.len(), 10);
        assert_eq!(integ.history_at(9).unwrap().len(), 12);
        assert!(integ.history_at(10).is_none());
    }

    #[test]
    fn test_zero_forcing_keeps_zero() {
        let mut integ = integrator(4, 8);
        let alpha = vec![0.75; 4];
        let f = vec![Complex64::new(0.0, 0.0); 4];
        for _ in 0..10 {
            integ.update_history(&f, &alpha, 0.01).unwrap();
        }
        let d = integ.compute_derivatives(&alpha).unwrap();
        assert!(d.iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn test_memory_free_order_has_no_history() {
        let mut integ = integrator(3, 8);
        let alpha = vec![2.0; 3];
        let f = vec![Complex64::new(5.0, -1.0); 3];
        integ.update_history(&f, &alpha, 0.01).unwrap();
        let d = integ.compute_derivatives(&alpha).unwrap();
        assert!(d.iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn test_matches_kernel_integral_for_constant_forcing() {
        // Constant f'' = 1 from t = 0: Σ z(t) = ∫₀ᵗ K̃(τ) dτ exactly.
        let mut integ = integrator(1, 12);
        let alpha = vec![0.75];
        let dt = 1e-3;
        let steps = 200;
        let f = vec![Complex64::new(1.0, 0.0)];
        for _ in 0..steps {
            integ.update_history(&f, &alpha, dt).unwrap();
        }
        let got = integ.compute_derivatives(&alpha).unwrap()[0].re;

        let kernel = integ.table().get(0.75).unwrap();
        let t = dt * steps as f64;
        let expected: f64 = kernel
            .weights
            .iter()
            .zip(&kernel.rates)
            .map(|(w, s)| w * (1.0 - (-s * t).exp()) / s)
            .sum();
        assert!((got - expected).abs() < 1e-9 * expected.abs());

        // And close to the analytic ∫₀ᵗ τ^(−1/2)/Γ(1/2) dτ = 2√t/√π.
        let analytic = 2.0 * t.sqrt() / std::f64::consts::PI.sqrt();
        assert!((got - analytic).abs() < 0.05 * analytic, "{got} vs {analytic}");
    }

    #[test]
    fn test_history_fades_after_forcing_stops() {
        let mut integ = integrator(1, 12);
        let alpha = vec![0.75];
        integ
            .update_history(&[Complex64::new(1.0, 0.0)], &alpha, 1e-3)
            .unwrap();
        let early = integ.compute_derivatives(&alpha).unwrap()[0].norm();
        for _ in 0..500 {
            integ
                .update_history(&[Complex64::new(0.0, 0.0)], &alpha, 1e-3)
                .unwrap();
        }
        let late = integ.compute_derivatives(&alpha).unwrap()[0].norm();
        assert!(late < early);
    }

    #[test]
    fn test_shape_and_nan_rejected() {
        let mut integ = integrator(4, 4);
        let alpha = vec![0.75; 4];
        let short = vec![Complex64::new(0.0, 0.0); 3];
        assert!(matches!(
            integ.update_history(&short, &alpha, 0.01),
            Err(GwError::Shape { .. })
        ));
        let nan = vec![Complex64::new(f64::NAN, 0.0); 4];
        assert!(matches!(
            integ.update_history(&nan, &alpha, 0.01),
            Err(GwError::Numerical(_))
        ));
        let ok = vec![Complex64::new(0.0, 0.0); 4];
        assert!(matches!(
            integ.update_history(&ok, &[0.75; 3], 0.01),
            Err(GwError::Shape { .. })
        ));
        assert!(matches!(
            integ.update_history(&ok, &[2.5; 4], 0.01),
            Err(GwError::InvalidOrder { .. })
        ));
    }

    #[test]
    fn test_rejected_order_then_valid_rebind() {
        let mut integ = integrator(3, 4);
        let ok = vec![Complex64::new(1.0, 0.0); 3];
        integ.update_history(&ok, &[0.75; 3], 0.01).unwrap();
        assert!(matches!(
            integ.update_history(&ok, &[1.25, 0.75, 2.5], 0.01),
            Err(GwError::InvalidOrder { .. })
        ));
        assert_eq!(integ.bound_kernels(), 0);
        integ.update_history(&ok, &[0.75; 3], 0.01).unwrap();
        assert_eq!(integ.bound_kernels(), 1);
        assert_eq!(integ.updates(), 2);
        let d = integ.compute_derivatives(&[0.75; 3]).unwrap();
        assert!(d.iter().all(|z| z.re > 0.0));
    }

    #[test]
    fn test_binding_shares_kernels() {
        let mut integ = integrator(6, 4);
        let alpha = vec![0.75, 0.75, 1.25, 1.25, 0.75, 2.0];
        integ.compute_derivatives(&alpha).unwrap();
        assert_eq!(integ.bound_kernels(), 3);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut integ = integrator(2, 4);
        let alpha = vec![0.75; 2];
        integ
            .update_history(&[Complex64::new(1.0, 1.0); 2], &alpha, 0.01)
            .unwrap();
        integ.reset();
        assert_eq!(integ.updates(), 0);
        assert!(integ.history_at(0).unwrap().iter().all(|z| z.norm() == 0.0));
    }
}
