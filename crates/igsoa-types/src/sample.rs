// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Sample and Snapshot Records
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// One observed strain measurement. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrainSample {
    pub time: f64,
    pub h_plus: f64,
    pub h_cross: f64,
    pub amplitude: f64,
    pub phase: f64,
}

impl StrainSample {
    /// Component-wise comparison within a relative tolerance.
    pub fn approx_eq(&self, other: &StrainSample, rel_tol: f64) -> bool {
        let close = |a: f64, b: f64| a == b || (a - b).abs() <= rel_tol * a.abs().max(b.abs());
        close(self.time, other.time)
            && close(self.h_plus, other.h_plus)
            && close(self.h_cross, other.h_cross)
            && close(self.amplitude, other.amplitude)
            && close(self.phase, other.phase)
    }
}

/// Aggregate field diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub max_amplitude: f64,
    pub mean_amplitude: f64,
    /// Σ|δΦ|²·dV.
    pub total_energy: f64,
    pub max_gradient: f64,
    pub mean_gradient: f64,
}

/// Flattened copy of the field at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub step: u64,
    pub time: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub real: Vec<f64>,
    pub imag: Vec<f64>,
    pub total_energy: f64,
    pub max_amplitude: f64,
}
