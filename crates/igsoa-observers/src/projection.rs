// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Field → Strain Projection
// ─────────────────────────────────────────────────────────────────────
//! Maps δΦ and its gradient onto observables.
//!
//!   O_00 = |δΦ|² + |∇δΦ|² + V
//!   O_0i = 0
//!   O_ij = Re(∂_iδΦ*·∂_jδΦ) − δ_ij·L,   L = |∇δΦ|² − V
//!
//!   h_+ = O_xx − O_yy,   h_× = 2·O_xy
//!
//! Properties:
//!   - O is symmetric
//!   - h_+ and h_× do not depend on L (it only shifts the diagonal)
//!   - an observer on the orbital axis of a point-symmetric source sees
//!     ∂_xδΦ = ∂_yδΦ = 0 and hence zero strain

use std::sync::atomic::{AtomicBool, Ordering};

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use igsoa_field::FieldGrid;
use igsoa_types::{GwError, GwResult, ProjectionConfig, StrainSample, Vec3};

/// Symmetric 4×4 stress tensor, index 0 = time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StressTensor {
    pub components: [[f64; 4]; 4],
}

impl StressTensor {
    /// Build from a field value, its gradient and the potential V(δΦ).
    pub fn from_field(phi: Complex64, grad: &[Complex64; 3], potential: f64) -> Self {
        let grad_sq: f64 = grad.iter().map(|g| g.norm_sqr()).sum();
        let lagrangian = grad_sq - potential;
        let mut c = [[0.0; 4]; 4];
        c[0][0] = phi.norm_sqr() + grad_sq + potential;
        for i in 0..3 {
            for j in i..3 {
                let mut v = (grad[i].conj() * grad[j]).re;
                if i == j {
                    v -= lagrangian;
                }
                c[i + 1][j + 1] = v;
                c[j + 1][i + 1] = v;
            }
        }
        Self { components: c }
    }

    #[inline]
    pub fn get(&self, mu: usize, nu: usize) -> f64 {
        self.components[mu][nu]
    }

    pub fn trace(&self) -> f64 {
        (0..4).map(|m| self.components[m][m]).sum()
    }

    pub fn frobenius(&self) -> f64 {
        self.components
            .iter()
            .flatten()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// Spatial block with its trace removed.
    pub fn spatial_traceless(&self) -> [[f64; 3]; 3] {
        let tr = (1..4).map(|i| self.components[i][i]).sum::<f64>() / 3.0;
        let mut out = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                out[i][j] = self.components[i + 1][j + 1];
            }
            out[i][i] -= tr;
        }
        out
    }

    pub fn strain(&self) -> StrainComponents {
        StrainComponents::new(
            self.get(1, 1) - self.get(2, 2),
            2.0 * self.get(1, 2),
        )
    }
}

/// Two polarizations plus their polar form.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StrainComponents {
    pub h_plus: f64,
    pub h_cross: f64,
    pub amplitude: f64,
    pub phase: f64,
}

impl StrainComponents {
    pub fn new(h_plus: f64, h_cross: f64) -> Self {
        Self {
            h_plus,
            h_cross,
            amplitude: h_plus.hypot(h_cross),
            phase: h_cross.atan2(h_plus),
        }
    }

    pub fn to_sample(self, time: f64) -> StrainSample {
        StrainSample {
            time,
            h_plus: self.h_plus,
            h_cross: self.h_cross,
            amplitude: self.amplitude,
            phase: self.phase,
        }
    }
}

/// Everything measured at one observer position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrainReading {
    pub position: Vec3,
    pub strain: StrainComponents,
    pub tensor: StressTensor,
    /// φ-mode: |δΦ|.
    pub scalar: f64,
    /// B_i = Im(δΦ*·∂_iδΦ)/|δΦ|².
    pub causal_flow: [f64; 3],
    /// Distance from the orbital axis through the source center.
    pub distance_to_axis: f64,
    /// Observer lies on the orbital axis; zero strain is expected there.
    pub on_symmetry_axis: bool,
}

impl StrainReading {
    pub fn to_sample(&self, time: f64) -> StrainSample {
        self.strain.to_sample(time)
    }
}

/// B_i = Im(φ*·∂_iφ)/|φ|², zero where the field vanishes.
pub fn causal_flow(phi: Complex64, grad: &[Complex64; 3]) -> [f64; 3] {
    let m2 = phi.norm_sqr();
    if m2 < 1e-300 {
        return [0.0; 3];
    }
    [
        (phi.conj() * grad[0]).im / m2,
        (phi.conj() * grad[1]).im / m2,
        (phi.conj() * grad[2]).im / m2,
    ]
}

/// Distance from `p` to the line through `center` parallel to z.
pub fn distance_to_orbital_axis(p: Vec3, center: Vec3) -> f64 {
    (p.x - center.x).hypot(p.y - center.y)
}

/// Strain extractor for a fixed observer.
pub struct Projector {
    config: ProjectionConfig,
    axis_warned: AtomicBool,
}

impl Projector {
    pub fn new(config: ProjectionConfig) -> GwResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            axis_warned: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    pub fn observer(&self) -> Vec3 {
        self.config.observer
    }

    /// Tensor at a grid node.
    pub fn stress_tensor(&self, grid: &FieldGrid, i: usize, j: usize, k: usize) -> GwResult<StressTensor> {
        let phi = grid.get(i, j, k)?;
        let grad = grid.gradient(i, j, k)?;
        Ok(StressTensor::from_field(phi, &grad, grid.potential(phi)))
    }

    pub fn strain_at_node(&self, grid: &FieldGrid, i: usize, j: usize, k: usize) -> GwResult<StrainComponents> {
        Ok(self.stress_tensor(grid, i, j, k)?.strain())
    }

    /// φ-mode at an arbitrary position.
    pub fn scalar_mode(&self, grid: &FieldGrid, position: Vec3) -> GwResult<f64> {
        Ok(grid.interpolate(position)?.norm())
    }

    /// φ-mode |δΦ| at every node, in the grid's flat order.
    pub fn scalar_mode_field(&self, grid: &FieldGrid) -> Vec<f64> {
        grid.field().par_iter().map(|z| z.norm()).collect()
    }

    /// Interpolate δΦ and ∇δΦ at `position` and project.
    ///
    /// `axis_center` is the source center used for the on-axis
    /// diagnostic. Positions outside the grid fail with `OutOfDomain`.
    pub fn strain_at(&self, grid: &FieldGrid, position: Vec3, axis_center: Vec3) -> GwResult<StrainReading> {
        let phi = grid.interpolate(position)?;
        let grad = grid.interpolate_gradient(position)?;
        if !(phi.re.is_finite() && phi.im.is_finite()) {
            return Err(GwError::Numerical(format!(
                "non-finite field at observer {position:?}"
            )));
        }
        let tensor = StressTensor::from_field(phi, &grad, grid.potential(phi));
        let distance_to_axis = distance_to_orbital_axis(position, axis_center);
        let on_symmetry_axis = distance_to_axis <= self.config.axis_tolerance;
        Ok(StrainReading {
            position,
            strain: tensor.strain(),
            tensor,
            scalar: phi.norm(),
            causal_flow: causal_flow(phi, &grad),
            distance_to_axis,
            on_symmetry_axis,
        })
    }

    /// Strain at the configured observer.
    pub fn strain_at_observer(&self, grid: &FieldGrid, axis_center: Vec3) -> GwResult<StrainReading> {
        let reading = self.strain_at(grid, self.config.observer, axis_center)?;
        if reading.on_symmetry_axis && !self.axis_warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "observer {:?} is {:.3e} m from the orbital axis; strain vanishes there by symmetry",
                reading.position,
                reading.distance_to_axis
            );
        }
        Ok(reading)
    }
}
