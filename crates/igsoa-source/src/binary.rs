// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Binary Source
// ─────────────────────────────────────────────────────────────────────
//! Two compact bodies on a circular orbit in the plane z = center.z.
//!
//!   ω      = √(G·M / r³)
//!   dr/dt  = −(64/5)·G³·m₁·m₂·M / (c⁵·r³)      (inspiral only)
//!   S(x)   = A·Σ_i (m_i/m₁)·exp(−|x − x_i|² / 2σ²)
//!
//! Merger is flagged once r ≤ horizon_order · R_s, R_s = 2GM/c².

use std::f64::consts::TAU;

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use igsoa_types::{BinaryConfig, GridGeometry, GwError, GwResult, Vec3};

/// Newtonian constant (m³ kg⁻¹ s⁻²).
pub const G: f64 = 6.67430e-11;
/// Speed of light (m/s).
pub const C: f64 = 299_792_458.0;
/// Solar mass (kg).
pub const M_SUN: f64 = 1.98847e30;

/// Read-only view of the orbital state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitState {
    pub time: f64,
    pub separation: f64,
    pub phase: f64,
    pub angular_frequency: f64,
    pub position1: Vec3,
    pub position2: Vec3,
    pub velocity1: Vec3,
    pub velocity2: Vec3,
    pub merged: bool,
}

pub struct BinarySystem {
    config: BinaryConfig,
    m1: f64,
    m2: f64,
    total: f64,
    merger_radius: f64,
    separation: f64,
    phase: f64,
    omega: f64,
    time: f64,
    merged: bool,
    merger_time: Option<f64>,
    energy_radiated: f64,
}

impl BinarySystem {
    pub fn new(config: BinaryConfig) -> GwResult<Self> {
        config.validate()?;
        let m1 = config.mass1 * M_SUN;
        let m2 = config.mass2 * M_SUN;
        let total = m1 + m2;
        let rs = 2.0 * G * total / (C * C);
        let merger_radius = config.horizon_order * rs;
        let separation = config.initial_separation;

        log::info!(
            "binary {} + {} Msun, r = {} m, R_s = {:.1} m, inspiral {}",
            config.mass1,
            config.mass2,
            separation,
            rs,
            config.enable_inspiral
        );

        Ok(Self {
            phase: config.initial_phase.rem_euclid(TAU),
            omega: (G * total / separation.powi(3)).sqrt(),
            config,
            m1,
            m2,
            total,
            merger_radius,
            separation,
            time: 0.0,
            merged: false,
            merger_time: None,
            energy_radiated: 0.0,
        })
    }

    pub fn config(&self) -> &BinaryConfig {
        &self.config
    }

    pub fn center(&self) -> Vec3 {
        self.config.center
    }

    pub fn separation(&self) -> f64 {
        self.separation
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// ω (rad/s).
    pub fn angular_frequency(&self) -> f64 {
        self.omega
    }

    /// Dominant GW frequency, twice the orbital frequency (Hz).
    pub fn gw_frequency(&self) -> f64 {
        self.omega / std::f64::consts::PI
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    pub fn merger_time(&self) -> Option<f64> {
        self.merger_time
    }

    /// Total mass (solar masses).
    pub fn total_mass(&self) -> f64 {
        self.total / M_SUN
    }

    /// μ = m₁m₂/M (solar masses).
    pub fn reduced_mass(&self) -> f64 {
        self.m1 * self.m2 / self.total / M_SUN
    }

    /// (m₁m₂)^(3/5) / M^(1/5) (solar masses).
    pub fn chirp_mass(&self) -> f64 {
        (self.m1 * self.m2).powf(0.6) / self.total.powf(0.2) / M_SUN
    }

    /// R_s = 2GM/c² (m).
    pub fn schwarzschild_radius(&self) -> f64 {
        2.0 * G * self.total / (C * C)
    }

    pub fn merger_radius(&self) -> f64 {
        self.merger_radius
    }

    /// Energy carried off by radiation reaction so far (J).
    pub fn energy_radiated(&self) -> f64 {
        self.energy_radiated
    }

    /// Quadrupole luminosity (32/5)·G⁴(m₁m₂)²M / (c⁵r⁵) (W).
    pub fn gw_luminosity(&self) -> f64 {
        if self.merged {
            return 0.0;
        }
        32.0 / 5.0 * G.powi(4) * (self.m1 * self.m2).powi(2) * self.total
            / (C.powi(5) * self.separation.powi(5))
    }

    fn inspiral_rate(&self, r: f64) -> f64 {
        -64.0 / 5.0 * G.powi(3) * self.m1 * self.m2 * self.total / (C.powi(5) * r.powi(3))
    }

    /// Peters estimate (5/256)·c⁵r⁴ / (G³m₁m₂M); `None` without inspiral
    /// or after merger.
    pub fn time_to_merger(&self) -> Option<f64> {
        if !self.config.enable_inspiral || self.merged {
            return None;
        }
        Some(
            5.0 / 256.0 * C.powi(5) * self.separation.powi(4)
                / (G.powi(3) * self.m1 * self.m2 * self.total),
        )
    }

    /// Advance the orbit by `dt`. Returns `true` on the step that merges.
    pub fn evolve_orbit(&mut self, dt: f64) -> GwResult<bool> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(GwError::Numerical(format!("orbit step dt = {dt}")));
        }
        self.time += dt;
        if self.merged {
            return Ok(false);
        }

        self.phase = (self.phase + self.omega * dt).rem_euclid(TAU);

        if self.config.enable_inspiral {
            self.energy_radiated += self.gw_luminosity() * dt;
            let r = self.separation + self.inspiral_rate(self.separation) * dt;
            if r <= self.merger_radius {
                self.separation = self.merger_radius;
                self.omega = (G * self.total / self.separation.powi(3)).sqrt();
                self.merged = true;
                self.merger_time = Some(self.time);
                log::info!(
                    "binary merged at t = {:.6} s (r = {:.1} m, E_rad = {:.3e} J)",
                    self.time,
                    self.separation,
                    self.energy_radiated
                );
                return Ok(true);
            }
            self.separation = r;
            self.omega = (G * self.total / r.powi(3)).sqrt();
        }
        Ok(false)
    }

    /// Distances of each body from the center of mass.
    fn radii(&self) -> (f64, f64) {
        let r1 = self.m2 / self.total * self.separation;
        let r2 = self.m1 / self.total * self.separation;
        (r1, r2)
    }

    pub fn positions(&self) -> (Vec3, Vec3) {
        let (r1, r2) = self.radii();
        let dir = Vec3::new(self.phase.cos(), self.phase.sin(), 0.0);
        (self.center() + dir * r1, self.center() - dir * r2)
    }

    pub fn velocities(&self) -> (Vec3, Vec3) {
        let (r1, r2) = self.radii();
        let tangent = Vec3::new(-self.phase.sin(), self.phase.cos(), 0.0);
        (tangent * (self.omega * r1), tangent * (-self.omega * r2))
    }

    pub fn state(&self) -> OrbitState {
        let (position1, position2) = self.positions();
        let (velocity1, velocity2) = self.velocities();
        OrbitState {
            time: self.time,
            separation: self.separation,
            phase: self.phase,
            angular_frequency: self.omega,
            position1,
            position2,
            velocity1,
            velocity2,
            merged: self.merged,
        }
    }

    /// Source density at one point; zero after merger.
    pub fn source_at(&self, x: Vec3) -> Complex64 {
        if self.merged {
            return Complex64::new(0.0, 0.0);
        }
        let (p1, p2) = self.positions();
        let two_sigma_sq = 2.0 * self.config.gaussian_width.powi(2);
        let a2 = self.m2 / self.m1;
        let s = (-(x - p1).norm_sq() / two_sigma_sq).exp()
            + a2 * (-(x - p2).norm_sq() / two_sigma_sq).exp();
        Complex64::new(self.config.source_amplitude * s, 0.0)
    }

    /// Overwrite `out` with the source sampled at every grid node.
    pub fn compute_source(&self, geometry: &GridGeometry, out: &mut [Complex64]) -> GwResult<()> {
        if out.len() != geometry.len() {
            return Err(GwError::shape("source buffer", geometry.len(), out.len()));
        }
        if self.merged {
            out.par_iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
            return Ok(());
        }
        let g = *geometry;
        out.par_iter_mut().enumerate().for_each(|(idx, v)| {
            let (i, j, k) = g.unflatten(idx);
            *v = self.source_at(g.position(i, j, k));
        });
        Ok(())
    }

    pub fn reset(&mut self) {
        self.separation = self.config.initial_separation;
        self.phase = self.config.initial_phase.rem_euclid(TAU);
        self.omega = (G * self.total / self.separation.powi(3)).sqrt();
        self.time = 0.0;
        self.merged = false;
        self.merger_time = None;
        self.energy_radiated = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutron_stars() -> BinaryConfig {
        BinaryConfig {
            mass1: 1.4,
            mass2: 1.4,
            initial_separation: 50e3,
            center: Vec3::new(100e3, 100e3, 100e3),
            enable_inspiral: true,
            ..BinaryConfig::default()
        }
    }

    #[test]
    fn test_circular_orbit_keeps_separation() {
        let mut b = BinarySystem::new(BinaryConfig::default()).unwrap();
        let omega = b.angular_frequency();
        let expected = (G * 60.0 * M_SUN / 20e3f64.powi(3)).sqrt();
        assert!((omega - expected).abs() < 1e-9 * expected);
        b.evolve_orbit(1e-5).unwrap();
        assert_eq!(b.separation(), 20e3);
        assert!((b.phase() - (omega * 1e-5).rem_euclid(TAU)).abs() < 1e-9);
        assert!(!b.is_merged());
        assert!(b.time_to_merger().is_none());
    }

    #[test]
    fn test_phase_wraps() {
        let mut b = BinarySystem::new(BinaryConfig::default()).unwrap();
        for _ in 0..1000 {
            b.evolve_orbit(1e-3).unwrap();
            assert!((0.0..TAU).contains(&b.phase()));
        }
    }

    #[test]
    fn test_positions_split_by_mass() {
        let cfg = BinaryConfig {
            mass1: 30.0,
            mass2: 10.0,
            initial_separation: 8000.0,
            center: Vec3::new(1.0, 2.0, 3.0),
            ..BinaryConfig::default()
        };
        let b = BinarySystem::new(cfg).unwrap();
        let (p1, p2) = b.positions();
        assert!((p1.distance(p2) - 8000.0).abs() < 1e-6);
        assert!((p1.distance(b.center()) - 2000.0).abs() < 1e-6);
        assert!((p2.distance(b.center()) - 6000.0).abs() < 1e-6);
        assert_eq!(p1.z, 3.0);
        let (v1, v2) = b.velocities();
        // Zero total momentum.
        let p = v1 * 30.0 + v2 * 10.0;
        assert!(p.norm() < 1e-6 * v1.norm());
    }

    #[test]
    fn test_inspiral_merges_near_peters_time() {
        let mut b = BinarySystem::new(neutron_stars()).unwrap();
        let t_peters = b.time_to_merger().unwrap();
        let r0 = b.separation();
        let mut merged_at = None;
        for _ in 0..100_000 {
            if b.evolve_orbit(1e-5).unwrap() {
                merged_at = b.merger_time();
                break;
            }
        }
        let t = merged_at.expect("binary should merge");
        assert!((t - t_peters).abs() < 0.1 * t_peters, "{t} vs {t_peters}");
        assert!(b.separation() < r0);
        assert_eq!(b.separation(), b.merger_radius());
        assert!(b.energy_radiated() > 0.0);
        assert!(b.time_to_merger().is_none());
    }

    #[test]
    fn test_frozen_after_merger() {
        let mut b = BinarySystem::new(neutron_stars()).unwrap();
        while !b.evolve_orbit(1e-5).unwrap() {}
        let phase = b.phase();
        assert!(!b.evolve_orbit(1e-5).unwrap());
        assert_eq!(b.phase(), phase);
        assert_eq!(b.source_at(b.center()), Complex64::new(0.0, 0.0));
        assert_eq!(b.gw_luminosity(), 0.0);
    }

    #[test]
    fn test_source_peaks_at_bodies() {
        let cfg = BinaryConfig {
            mass1: 20.0,
            mass2: 10.0,
            initial_separation: 100e3,
            gaussian_width: 1e3,
            source_amplitude: 2.0,
            ..BinaryConfig::default()
        };
        let b = BinarySystem::new(cfg).unwrap();
        let (p1, p2) = b.positions();
        assert!((b.source_at(p1).re - 2.0).abs() < 1e-9);
        assert!((b.source_at(p2).re - 1.0).abs() < 1e-9);
        assert!(b.source_at(b.center()).re < 1e-9);
    }

    #[test]
    fn test_compute_source_fills_grid() {
        let geometry = GridGeometry {
            nx: 5,
            ny: 5,
            nz: 3,
            dx: 1000.0,
            dy: 1000.0,
            dz: 1000.0,
        };
        let cfg = BinaryConfig {
            initial_separation: 2000.0,
            center: geometry.center(),
            gaussian_width: 500.0,
            ..BinaryConfig::default()
        };
        let b = BinarySystem::new(cfg).unwrap();
        let mut out = vec![Complex64::new(9.0, 9.0); geometry.len()];
        b.compute_source(&geometry, &mut out).unwrap();
        // Phase 0: bodies at x = 3000 and x = 1000 on the middle row.
        let at_body = out[geometry.flat_index(3, 2, 1)];
        let expected = 1.0 + (-8.0f64).exp();
        assert!((at_body.re - expected).abs() < 1e-9);
        assert_eq!(at_body.im, 0.0);
        assert!(matches!(
            b.compute_source(&geometry, &mut out[..3]),
            Err(GwError::Shape { .. })
        ));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut b = BinarySystem::new(neutron_stars()).unwrap();
        for _ in 0..100 {
            b.evolve_orbit(1e-5).unwrap();
        }
        b.reset();
        assert_eq!(b.separation(), 50e3);
        assert_eq!(b.time(), 0.0);
        assert_eq!(b.energy_radiated(), 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = BinaryConfig {
            mass1: -1.0,
            ..BinaryConfig::default()
        };
        assert!(matches!(
            BinarySystem::new(cfg),
            Err(GwError::Configuration { .. })
        ));
    }
}
