// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Symmetry Field Grid
// ─────────────────────────────────────────────────────────────────────
//! 3D complex field δΦ with per-point memory order α.
//!
//! One explicit step advances every node by
//!
//!   δΦ ← δΦ + dt·(∇²δΦ − D^α δΦ − ∂V/∂δΦ* + S)
//!   V(δΦ) = λ|δΦ|² + κ|δΦ|⁴,  ∂V/∂δΦ* = λδΦ + 2κ|δΦ|²δΦ
//!
//! reading only the prior level. Boundaries use a mirrored ghost node
//! (zero normal gradient), so every node is updated.

use num_complex::Complex64;
use rayon::prelude::*;

use igsoa_types::{
    FieldSnapshot, FieldStats, GridConfig, GridGeometry, GwError, GwResult, Vec3,
};

use crate::alloc::{
    exhausted, guarded_vec, node_count, node_count_u128, required_bytes, LARGE_ALLOCATION_BYTES,
};
use crate::kernel::check_order;

/// Bytes per node: field, next level, α, gradient cache, potential cache.
const BYTES_PER_NODE: usize = 2 * std::mem::size_of::<Complex64>() + 3 * std::mem::size_of::<f64>();

const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };

/// Trilinear stencil: 8 node indices and weights.
struct Stencil {
    idx: [usize; 8],
    w: [f64; 8],
}

/// Centered difference along one axis; one-sided at the faces.
#[inline]
fn axis_derivative(
    field: &[Complex64],
    idx: usize,
    pos: usize,
    n: usize,
    stride: usize,
    d: f64,
) -> Complex64 {
    if n < 2 {
        ZERO
    } else if pos == 0 {
        (field[idx + stride] - field[idx]) / d
    } else if pos == n - 1 {
        (field[idx] - field[idx - stride]) / d
    } else {
        (field[idx + stride] - field[idx - stride]) / (2.0 * d)
    }
}

/// Three-point second difference with mirrored ghost nodes.
#[inline]
fn axis_second(
    field: &[Complex64],
    idx: usize,
    pos: usize,
    n: usize,
    stride: usize,
    d: f64,
) -> Complex64 {
    if n < 2 {
        return ZERO;
    }
    let minus = if pos == 0 {
        field[idx + stride]
    } else {
        field[idx - stride]
    };
    let plus = if pos == n - 1 {
        field[idx - stride]
    } else {
        field[idx + stride]
    };
    (plus - field[idx] * 2.0 + minus) / (d * d)
}

#[inline]
fn gradient_of(field: &[Complex64], g: &GridGeometry, idx: usize) -> [Complex64; 3] {
    let (i, j, k) = g.unflatten(idx);
    [
        axis_derivative(field, idx, i, g.nx, 1, g.dx),
        axis_derivative(field, idx, j, g.ny, g.nx, g.dy),
        axis_derivative(field, idx, k, g.nz, g.nx * g.ny, g.dz),
    ]
}

#[inline]
fn laplacian_of(field: &[Complex64], g: &GridGeometry, idx: usize) -> Complex64 {
    let (i, j, k) = g.unflatten(idx);
    axis_second(field, idx, i, g.nx, 1, g.dx)
        + axis_second(field, idx, j, g.ny, g.nx, g.dy)
        + axis_second(field, idx, k, g.nz, g.nx * g.ny, g.dz)
}

#[inline]
fn norm_of(v: &[Complex64; 3]) -> f64 {
    (v[0].norm_sqr() + v[1].norm_sqr() + v[2].norm_sqr()).sqrt()
}

/// Self-interaction potential V = λ|φ|² + κ|φ|⁴.
#[inline]
pub fn potential(lambda: f64, kappa: f64, phi: Complex64) -> f64 {
    let m2 = phi.norm_sqr();
    lambda * m2 + kappa * m2 * m2
}

/// ∂V/∂φ* = λφ + 2κ|φ|²φ.
#[inline]
pub fn potential_derivative(lambda: f64, kappa: f64, phi: Complex64) -> Complex64 {
    phi * (lambda + 2.0 * kappa * phi.norm_sqr())
}

/// The simulated field and its per-node caches.
pub struct FieldGrid {
    config: GridConfig,
    geometry: GridGeometry,
    phi: Vec<Complex64>,
    next: Vec<Complex64>,
    alpha: Vec<f64>,
    grad_mag: Vec<f64>,
    potential: Vec<f64>,
    time: f64,
    steps: u64,
}

impl FieldGrid {
    /// Validate `config` and allocate every buffer up front.
    pub fn new(config: GridConfig) -> GwResult<Self> {
        config.validate()?;
        let geometry = config.geometry();

        let total = required_bytes(node_count_u128(&geometry), BYTES_PER_NODE);
        let n = node_count(&geometry).ok_or_else(|| exhausted("field grid", total, &geometry))?;
        if total > LARGE_ALLOCATION_BYTES {
            log::warn!(
                "field grid {}x{}x{} needs {:.2} GiB",
                geometry.nx,
                geometry.ny,
                geometry.nz,
                total as f64 / LARGE_ALLOCATION_BYTES as f64
            );
        } else {
            log::debug!("field grid allocation: {total} bytes");
        }

        let phi = guarded_vec("field grid", n, ZERO, &geometry)?;
        let next = guarded_vec("field grid", n, ZERO, &geometry)?;
        let alpha = guarded_vec("field grid", n, config.alpha_max, &geometry)?;
        let grad_mag = guarded_vec("field grid", n, 0.0, &geometry)?;
        let potential = guarded_vec("field grid", n, 0.0, &geometry)?;

        log::info!(
            "field grid {}x{}x{} (d = {}, {}, {} m, dt = {} s, alpha in [{}, {}])",
            geometry.nx,
            geometry.ny,
            geometry.nz,
            geometry.dx,
            geometry.dy,
            geometry.dz,
            config.dt,
            config.alpha_min,
            config.alpha_max
        );

        Ok(Self {
            config,
            geometry,
            phi,
            next,
            alpha,
            grad_mag,
            potential,
            time: 0.0,
            steps: 0,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.phi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phi.is_empty()
    }

    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Flattened field values.
    pub fn field(&self) -> &[Complex64] {
        &self.phi
    }

    /// Flattened memory orders.
    pub fn alpha_field(&self) -> &[f64] {
        &self.alpha
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.phi.len() * BYTES_PER_NODE
    }

    fn index(&self, i: usize, j: usize, k: usize) -> GwResult<usize> {
        if self.geometry.contains_index(i, j, k) {
            Ok(self.geometry.flat_index(i, j, k))
        } else {
            Err(GwError::Index {
                i,
                j,
                k,
                nx: self.geometry.nx,
                ny: self.geometry.ny,
                nz: self.geometry.nz,
            })
        }
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> GwResult<Complex64> {
        Ok(self.phi[self.index(i, j, k)?])
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: Complex64) -> GwResult<()> {
        let idx = self.index(i, j, k)?;
        self.phi[idx] = value;
        self.refresh_node(idx);
        Ok(())
    }

    /// Replace the whole field.
    pub fn set_field(&mut self, values: &[Complex64]) -> GwResult<()> {
        if values.len() != self.phi.len() {
            return Err(GwError::shape("field", self.phi.len(), values.len()));
        }
        self.phi.copy_from_slice(values);
        self.refresh_caches();
        Ok(())
    }

    /// Set every node from a function of its position.
    pub fn fill_with<F>(&mut self, f: F)
    where
        F: Fn(Vec3) -> Complex64 + Sync,
    {
        let g = self.geometry;
        self.phi.par_iter_mut().enumerate().for_each(|(idx, v)| {
            let (i, j, k) = g.unflatten(idx);
            *v = f(g.position(i, j, k));
        });
        self.refresh_caches();
    }

    pub fn alpha(&self, i: usize, j: usize, k: usize) -> GwResult<f64> {
        Ok(self.alpha[self.index(i, j, k)?])
    }

    /// α must lie in (0, 2] and inside the configured range.
    pub fn set_alpha(&mut self, i: usize, j: usize, k: usize, alpha: f64) -> GwResult<()> {
        let idx = self.index(i, j, k)?;
        check_order(alpha)?;
        if !(self.config.alpha_min..=self.config.alpha_max).contains(&alpha) {
            return Err(GwError::config(
                "alpha",
                alpha,
                format!("in [{}, {}]", self.config.alpha_min, self.config.alpha_max),
            ));
        }
        self.alpha[idx] = alpha;
        Ok(())
    }

    /// Uniform memory order.
    pub fn fill_alpha(&mut self, alpha: f64) -> GwResult<()> {
        check_order(alpha)?;
        if !(self.config.alpha_min..=self.config.alpha_max).contains(&alpha) {
            return Err(GwError::config(
                "alpha",
                alpha,
                format!("in [{}, {}]", self.config.alpha_min, self.config.alpha_max),
            ));
        }
        self.alpha.iter_mut().for_each(|a| *a = alpha);
        Ok(())
    }

    /// Radius of the α profile: R_c times the half-extent of the
    /// shortest non-degenerate axis.
    pub fn alpha_profile_radius(&self) -> f64 {
        let half = self
            .geometry
            .extent()
            .into_iter()
            .filter(|&e| e > 0.0)
            .fold(f64::INFINITY, f64::min)
            * 0.5;
        let half = if half.is_finite() { half } else { self.geometry.dx };
        self.config.causal_resistance * half
    }

    /// α(r) = α_max − (α_max − α_min)·exp(−r / R), deepest memory at `center`.
    pub fn fill_alpha_radial(&mut self, center: Vec3) {
        let (lo, hi) = (self.config.alpha_min, self.config.alpha_max);
        let radius = self.alpha_profile_radius();
        let g = self.geometry;
        self.alpha.par_iter_mut().enumerate().for_each(|(idx, a)| {
            let (i, j, k) = g.unflatten(idx);
            let r = g.position(i, j, k).distance(center);
            *a = (hi - (hi - lo) * (-r / radius).exp()).clamp(lo, hi);
        });
    }

    /// ∇δΦ at a node.
    pub fn gradient(&self, i: usize, j: usize, k: usize) -> GwResult<[Complex64; 3]> {
        let idx = self.index(i, j, k)?;
        Ok(gradient_of(&self.phi, &self.geometry, idx))
    }

    pub fn laplacian(&self, i: usize, j: usize, k: usize) -> GwResult<Complex64> {
        let idx = self.index(i, j, k)?;
        Ok(laplacian_of(&self.phi, &self.geometry, idx))
    }

    pub fn gradient_magnitude(&self, i: usize, j: usize, k: usize) -> GwResult<f64> {
        Ok(self.grad_mag[self.index(i, j, k)?])
    }

    pub fn potential_at(&self, i: usize, j: usize, k: usize) -> GwResult<f64> {
        Ok(self.potential[self.index(i, j, k)?])
    }

    pub fn potential(&self, phi: Complex64) -> f64 {
        potential(self.config.lambda, self.config.kappa, phi)
    }

    pub fn potential_derivative(&self, phi: Complex64) -> Complex64 {
        potential_derivative(self.config.lambda, self.config.kappa, phi)
    }

    fn out_of_domain(&self, p: Vec3) -> GwError {
        GwError::OutOfDomain {
            x: p.x,
            y: p.y,
            z: p.z,
            extent: self.geometry.extent(),
        }
    }

    fn stencil(&self, p: Vec3) -> GwResult<Stencil> {
        if !self.geometry.contains_position(p) {
            return Err(self.out_of_domain(p));
        }
        let g = &self.geometry;
        let axis = |coord: f64, n: usize, d: f64| -> (usize, usize, f64) {
            if n < 2 {
                return (0, 0, 0.0);
            }
            let u = coord / d;
            let i0 = (u.floor() as usize).min(n - 2);
            (i0, i0 + 1, u - i0 as f64)
        };
        let (i0, i1, tx) = axis(p.x, g.nx, g.dx);
        let (j0, j1, ty) = axis(p.y, g.ny, g.dy);
        let (k0, k1, tz) = axis(p.z, g.nz, g.dz);

        let mut idx = [0usize; 8];
        let mut w = [0.0f64; 8];
        let mut c = 0;
        for (k, wz) in [(k0, 1.0 - tz), (k1, tz)] {
            for (j, wy) in [(j0, 1.0 - ty), (j1, ty)] {
                for (i, wx) in [(i0, 1.0 - tx), (i1, tx)] {
                    idx[c] = g.flat_index(i, j, k);
                    w[c] = wx * wy * wz;
                    c += 1;
                }
            }
        }
        Ok(Stencil { idx, w })
    }

    /// Trilinear δΦ at a physical position inside `[0, (n−1)·d]`.
    pub fn interpolate(&self, p: Vec3) -> GwResult<Complex64> {
        let s = self.stencil(p)?;
        Ok(s.idx
            .iter()
            .zip(&s.w)
            .map(|(&idx, &w)| self.phi[idx] * w)
            .sum())
    }

    /// Trilinear blend of the nodal gradients.
    pub fn interpolate_gradient(&self, p: Vec3) -> GwResult<[Complex64; 3]> {
        let s = self.stencil(p)?;
        let mut out = [ZERO; 3];
        for (&idx, &w) in s.idx.iter().zip(&s.w) {
            if w == 0.0 {
                continue;
            }
            let g = gradient_of(&self.phi, &self.geometry, idx);
            for a in 0..3 {
                out[a] += g[a] * w;
            }
        }
        Ok(out)
    }

    pub fn interpolate_alpha(&self, p: Vec3) -> GwResult<f64> {
        let s = self.stencil(p)?;
        Ok(s.idx.iter().zip(&s.w).map(|(&idx, &w)| self.alpha[idx] * w).sum())
    }

    /// Advance one timestep. `fractional` and `source` are per-node.
    ///
    /// On error the field is left untouched.
    pub fn evolve_step(&mut self, fractional: &[Complex64], source: &[Complex64]) -> GwResult<()> {
        let n = self.phi.len();
        if fractional.len() != n {
            return Err(GwError::shape("fractional derivative", n, fractional.len()));
        }
        if source.len() != n {
            return Err(GwError::shape("source", n, source.len()));
        }
        let finite = |z: &Complex64| z.re.is_finite() && z.im.is_finite();
        if !fractional.par_iter().all(finite) {
            return Err(GwError::Numerical("non-finite fractional derivative".into()));
        }
        if !source.par_iter().all(finite) {
            return Err(GwError::Numerical("non-finite source term".into()));
        }

        let g = self.geometry;
        let (dt, lambda, kappa) = (self.config.dt, self.config.lambda, self.config.kappa);
        let phi = &self.phi;
        self.next.par_iter_mut().enumerate().for_each(|(idx, out)| {
            let old = phi[idx];
            let rhs = laplacian_of(phi, &g, idx) - fractional[idx]
                - potential_derivative(lambda, kappa, old)
                + source[idx];
            *out = old + rhs * dt;
        });

        if !self.next.par_iter().all(finite) {
            log::error!(
                "field step {} at t = {} produced non-finite values",
                self.steps + 1,
                self.time + dt
            );
            return Err(GwError::Numerical(format!(
                "field diverged at step {}",
                self.steps + 1
            )));
        }

        std::mem::swap(&mut self.phi, &mut self.next);
        self.refresh_caches();
        self.time += dt;
        self.steps += 1;
        Ok(())
    }

    fn refresh_node(&mut self, idx: usize) {
        let (i, j, k) = self.geometry.unflatten(idx);
        // A change at idx moves the gradient of its face neighbours too.
        for (di, dj, dk) in [
            (0i64, 0i64, 0i64),
            (-1, 0, 0),
            (1, 0, 0),
            (0, -1, 0),
            (0, 1, 0),
            (0, 0, -1),
            (0, 0, 1),
        ] {
            let (ni, nj, nk) = (i as i64 + di, j as i64 + dj, k as i64 + dk);
            if ni < 0 || nj < 0 || nk < 0 {
                continue;
            }
            let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
            if !self.geometry.contains_index(ni, nj, nk) {
                continue;
            }
            let n = self.geometry.flat_index(ni, nj, nk);
            self.grad_mag[n] = norm_of(&gradient_of(&self.phi, &self.geometry, n));
        }
        let v = self.potential(self.phi[idx]);
        self.potential[idx] = v;
    }

    /// Recompute gradient-magnitude and potential caches.
    pub fn refresh_caches(&mut self) {
        let g = self.geometry;
        let (lambda, kappa) = (self.config.lambda, self.config.kappa);
        let phi = &self.phi;
        self.grad_mag
            .par_iter_mut()
            .zip(self.potential.par_iter_mut())
            .enumerate()
            .for_each(|(idx, (gm, v))| {
                *gm = norm_of(&gradient_of(phi, &g, idx));
                *v = potential(lambda, kappa, phi[idx]);
            });
    }

    pub fn statistics(&self) -> FieldStats {
        let n = self.phi.len().max(1) as f64;
        let (max_amp, sum_amp, sum_sq) = self
            .phi
            .par_iter()
            .map(|z| {
                let m = z.norm();
                (m, m, z.norm_sqr())
            })
            .reduce(
                || (0.0, 0.0, 0.0),
                |a, b| (a.0.max(b.0), a.1 + b.1, a.2 + b.2),
            );
        let (max_grad, sum_grad) = self
            .grad_mag
            .par_iter()
            .map(|&g| (g, g))
            .reduce(|| (0.0, 0.0), |a, b| (a.0.max(b.0), a.1 + b.1));
        FieldStats {
            max_amplitude: max_amp,
            mean_amplitude: sum_amp / n,
            total_energy: sum_sq * self.geometry.cell_volume(),
            max_gradient: max_grad,
            mean_gradient: sum_grad / n,
        }
    }

    /// Σ|δΦ|²·dV.
    pub fn total_energy(&self) -> f64 {
        self.phi.par_iter().map(|z| z.norm_sqr()).sum::<f64>() * self.geometry.cell_volume()
    }

    /// Flattened copy of the current state.
    pub fn snapshot(&self, step: u64) -> FieldSnapshot {
        let stats = self.statistics();
        FieldSnapshot {
            step,
            time: self.time,
            nx: self.geometry.nx,
            ny: self.geometry.ny,
            nz: self.geometry.nz,
            real: self.phi.iter().map(|z| z.re).collect(),
            imag: self.phi.iter().map(|z| z.im).collect(),
            total_energy: stats.total_energy,
            max_amplitude: stats.max_amplitude,
        }
    }

    /// Reset field and clock; α is kept.
    pub fn reset(&mut self) {
        self.phi.iter_mut().for_each(|z| *z = ZERO);
        self.refresh_caches();
        self.time = 0.0;
        self.steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n: usize, d: f64, dt: f64) -> GridConfig {
        GridConfig {
            nx: n,
            ny: n,
            nz: n,
            dx: d,
            dy: d,
            dz: d,
            dt,
            alpha_min: 1.0,
            alpha_max: 2.0,
            lambda: 0.1,
            kappa: 1.0,
            causal_resistance: 0.5,
        }
    }

    fn zeros(n: usize) -> Vec<Complex64> {
        vec![ZERO; n]
    }

    #[test]
    fn test_construction_allocates_all_nodes() {
        let grid = FieldGrid::new(config(6, 1.0, 0.1)).unwrap();
        assert_eq!(grid.len(), 216);
        assert_eq!(grid.alpha_field().len(), 216);
        assert!(grid.alpha_field().iter().all(|&a| a == 2.0));
        assert_eq!(grid.time(), 0.0);
    }

    #[test]
    fn test_cfl_violation_rejected() {
        let err = FieldGrid::new(config(4, 1.0, 0.6)).err().unwrap();
        assert!(matches!(err, GwError::Configuration { ref parameter, .. } if parameter == "dt"));
        assert!(FieldGrid::new(config(4, 1.0, 0.5)).is_ok());
    }

    #[test]
    fn test_oversized_grid_reports_resource_exhausted() {
        let err = FieldGrid::new(config(1 << 22, 1000.0, 0.001)).err().unwrap();
        match err {
            GwError::ResourceExhausted {
                required_bytes, nx, ..
            } => {
                assert_eq!(nx, 1 << 22);
                assert_eq!(required_bytes, (1u128 << 66) * BYTES_PER_NODE as u128);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_index_bounds_checked() {
        let mut grid = FieldGrid::new(config(4, 1.0, 0.1)).unwrap();
        assert!(matches!(grid.get(4, 0, 0), Err(GwError::Index { i: 4, .. })));
        assert!(matches!(
            grid.set(0, 0, 9, Complex64::new(1.0, 0.0)),
            Err(GwError::Index { .. })
        ));
        grid.set(1, 2, 3, Complex64::new(1.5, -0.5)).unwrap();
        assert_eq!(grid.get(1, 2, 3).unwrap(), Complex64::new(1.5, -0.5));
        assert!(grid.potential_at(1, 2, 3).unwrap() > 0.0);
    }

    #[test]
    fn test_set_alpha_range() {
        let mut grid = FieldGrid::new(config(3, 1.0, 0.1)).unwrap();
        grid.set_alpha(0, 0, 0, 1.5).unwrap();
        assert_eq!(grid.alpha(0, 0, 0).unwrap(), 1.5);
        assert!(matches!(
            grid.set_alpha(0, 0, 0, 2.5),
            Err(GwError::InvalidOrder { .. })
        ));
        assert!(matches!(
            grid.set_alpha(0, 0, 0, 0.5),
            Err(GwError::Configuration { .. })
        ));
    }

    #[test]
    fn test_gradient_of_sine_wave() {
        let mut cfg = config(64, 0.1, 0.05);
        cfg.ny = 3;
        cfg.nz = 3;
        let mut grid = FieldGrid::new(cfg).unwrap();
        grid.fill_with(|p| Complex64::new(p.x.sin(), 0.0));
        for i in 1..63 {
            let x = i as f64 * 0.1;
            let exact = x.cos();
            if exact.abs() < 0.2 {
                continue;
            }
            let g = grid.gradient(i, 1, 1).unwrap();
            let rel = (g[0].re - exact).abs() / exact.abs();
            assert!(rel < 0.05, "x = {x}: {} vs {exact}", g[0].re);
            assert!(g[1].norm() < 1e-12 && g[2].norm() < 1e-12);
        }
    }

    #[test]
    fn test_gradient_one_sided_at_faces() {
        let mut grid = FieldGrid::new(config(5, 0.5, 0.1)).unwrap();
        grid.fill_with(|p| Complex64::new(2.0 * p.y, -p.z));
        for (j, k) in [(0, 0), (4, 4), (2, 2)] {
            let g = grid.gradient(2, j, k).unwrap();
            assert!((g[1] - Complex64::new(2.0, 0.0)).norm() < 1e-12);
            assert!((g[2] - Complex64::new(0.0, -1.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_degenerate_axis_contributes_nothing() {
        let mut cfg = config(5, 1.0, 0.1);
        cfg.nz = 1;
        let mut grid = FieldGrid::new(cfg).unwrap();
        grid.fill_with(|p| Complex64::new(p.x, 0.0));
        let g = grid.gradient(2, 2, 0).unwrap();
        assert_eq!(g[2], ZERO);
        assert!((g[0].re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_laplacian_of_quadratic() {
        let mut grid = FieldGrid::new(config(7, 0.5, 0.1)).unwrap();
        grid.fill_with(|p| Complex64::new(p.x * p.x + p.y * p.y, 0.0));
        let lap = grid.laplacian(3, 3, 3).unwrap();
        assert!((lap.re - 4.0).abs() < 1e-9);
        // Mirrored ghost at x = 0: (2·φ(1) − 2·φ(0))/dx² in x.
        let edge = grid.laplacian(0, 3, 3).unwrap();
        assert!((edge.re - (2.0 * 0.25 / 0.25 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_linear_field_interpolates_exactly() {
        let mut grid = FieldGrid::new(config(5, 0.5, 0.1)).unwrap();
        let f = |p: Vec3| Complex64::new(1.0 + 2.0 * p.x - p.y + 0.5 * p.z, 3.0 * p.z - p.x);
        grid.fill_with(f);
        for p in [
            Vec3::new(0.3, 1.1, 0.77),
            Vec3::new(2.0, 2.0, 2.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.999, 0.001, 1.25),
        ] {
            let got = grid.interpolate(p).unwrap();
            assert!((got - f(p)).norm() < 1e-12, "{p:?}");
        }
    }

    #[test]
    fn test_interpolation_outside_domain() {
        let grid = FieldGrid::new(config(5, 0.5, 0.1)).unwrap();
        for p in [
            Vec3::new(2.01, 1.0, 1.0),
            Vec3::new(-0.01, 1.0, 1.0),
            Vec3::new(1.0, 1.0, f64::NAN),
        ] {
            assert!(matches!(grid.interpolate(p), Err(GwError::OutOfDomain { .. })));
        }
    }

    #[test]
    fn test_interpolated_gradient_of_linear_field() {
        let mut grid = FieldGrid::new(config(6, 1.0, 0.1)).unwrap();
        grid.fill_with(|p| Complex64::new(3.0 * p.x, p.y));
        let g = grid.interpolate_gradient(Vec3::new(2.5, 1.2, 4.9)).unwrap();
        assert!((g[0] - Complex64::new(3.0, 0.0)).norm() < 1e-12);
        assert!((g[1] - Complex64::new(0.0, 1.0)).norm() < 1e-12);
        assert!(g[2].norm() < 1e-12);
    }

    #[test]
    fn test_zero_field_zero_source_stays_zero() {
        let mut grid = FieldGrid::new(config(5, 1.0, 0.1)).unwrap();
        let z = zeros(grid.len());
        for _ in 0..20 {
            grid.evolve_step(&z, &z).unwrap();
        }
        assert!(grid.field().iter().all(|v| *v == ZERO));
        assert_eq!(grid.steps(), 20);
        assert!((grid.time() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_energy_grows_under_positive_source() {
        let mut grid = FieldGrid::new(config(5, 1.0, 0.01)).unwrap();
        let frac = zeros(grid.len());
        let source = vec![Complex64::new(1.0, 0.0); grid.len()];
        let mut last = grid.total_energy();
        for _ in 0..200 {
            grid.evolve_step(&frac, &source).unwrap();
            let e = grid.total_energy();
            assert!(e >= last, "energy fell from {last} to {e}");
            last = e;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn test_step_rejects_bad_inputs_and_keeps_field() {
        let mut grid = FieldGrid::new(config(3, 1.0, 0.1)).unwrap();
        grid.set(1, 1, 1, Complex64::new(0.5, 0.0)).unwrap();
        let before = grid.field().to_vec();
        let ok = zeros(grid.len());
        assert!(matches!(
            grid.evolve_step(&ok[..5], &ok),
            Err(GwError::Shape { .. })
        ));
        let mut bad = ok.clone();
        bad[4] = Complex64::new(f64::INFINITY, 0.0);
        assert!(matches!(grid.evolve_step(&ok, &bad), Err(GwError::Numerical(_))));
        assert_eq!(grid.field(), before.as_slice());
        assert_eq!(grid.steps(), 0);
    }

    #[test]
    fn test_radial_alpha_profile() {
        let mut grid = FieldGrid::new(config(9, 1.0, 0.1)).unwrap();
        let center = grid.geometry().center();
        grid.fill_alpha_radial(center);
        let at_center = grid.alpha(4, 4, 4).unwrap();
        let corner = grid.alpha(0, 0, 0).unwrap();
        assert!((at_center - 1.0).abs() < 1e-12);
        assert!(corner > at_center && corner <= 2.0);
        assert!(grid.alpha_field().iter().all(|&a| (1.0..=2.0).contains(&a)));
    }

    #[test]
    fn test_statistics() {
        let mut grid = FieldGrid::new(config(4, 0.5, 0.1)).unwrap();
        grid.fill_with(|_| Complex64::new(0.0, 2.0));
        let s = grid.statistics();
        assert!((s.max_amplitude - 2.0).abs() < 1e-12);
        assert!((s.mean_amplitude - 2.0).abs() < 1e-12);
        assert!((s.total_energy - 64.0 * 4.0 * 0.125).abs() < 1e-12);
        assert!(s.max_gradient < 1e-12);
    }

    #[test]
    fn test_snapshot_layout() {
        let mut grid = FieldGrid::new(config(3, 1.0, 0.1)).unwrap();
        grid.set(2, 1, 0, Complex64::new(1.0, -1.0)).unwrap();
        let snap = grid.snapshot(7);
        assert_eq!(snap.step, 7);
        assert_eq!(snap.real.len(), 27);
        let idx = grid.geometry().flat_index(2, 1, 0);
        assert_eq!(snap.real[idx], 1.0);
        assert_eq!(snap.imag[idx], -1.0);
        assert!((snap.max_amplitude - 2f64.sqrt()).abs() < 1e-12);
    }
}
