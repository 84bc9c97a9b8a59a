// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{GwError, GwResult};
use crate::geometry::{GridGeometry, Vec3};

fn positive(name: &str, value: f64) -> GwResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GwError::config(name, value, "finite and > 0"))
    }
}

fn non_negative(name: &str, value: f64) -> GwResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GwError::config(name, value, "finite and >= 0"))
    }
}

/// Field grid layout, timestep and potential couplings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Grid spacing (m).
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Timestep (s). Must satisfy `dt <= 0.5 * min(dx, dy, dz)`.
    pub dt: f64,
    /// Deepest memory order, reached at the merger center.
    pub alpha_min: f64,
    /// Memory order far from the source; 2.0 is the memory-free wave equation.
    pub alpha_max: f64,
    /// Quadratic potential coupling λ in V = λ|δΦ|² + κ|δΦ|⁴.
    pub lambda: f64,
    /// Quartic potential coupling κ.
    pub kappa: f64,
    /// Causal resistance R_c. Scales the radius of the α profile as a
    /// fraction of the half-extent of the grid.
    pub causal_resistance: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nx: 64,
            ny: 64,
            nz: 64,
            dx: 1000.0,
            dy: 1000.0,
            dz: 1000.0,
            dt: 0.001,
            alpha_min: 1.0,
            alpha_max: 2.0,
            lambda: 0.1,
            kappa: 1.0,
            causal_resistance: 0.5,
        }
    }
}

impl GridConfig {
    pub const CFL_FACTOR: f64 = 0.5;

    pub fn geometry(&self) -> GridGeometry {
        GridGeometry {
            nx: self.nx,
            ny: self.ny,
            nz: self.nz,
            dx: self.dx,
            dy: self.dy,
            dz: self.dz,
        }
    }

    pub fn min_spacing(&self) -> f64 {
        self.dx.min(self.dy).min(self.dz)
    }

    /// Validate in a fixed order: dimensions, spacing, timestep, CFL,
    /// memory-order range, couplings.
    pub fn validate(&self) -> GwResult<()> {
        for (name, n) in [("nx", self.nx), ("ny", self.ny), ("nz", self.nz)] {
            if n == 0 {
                return Err(GwError::config(name, n, ">= 1"));
            }
        }
        positive("dx", self.dx)?;
        positive("dy", self.dy)?;
        positive("dz", self.dz)?;
        positive("dt", self.dt)?;

        let dt_max = Self::CFL_FACTOR * self.min_spacing();
        if self.dt > dt_max {
            return Err(GwError::config(
                "dt",
                self.dt,
                format!("<= 0.5 * min(dx, dy, dz) = {dt_max} (CFL)"),
            ));
        }

        for (name, a) in [("alpha_min", self.alpha_min), ("alpha_max", self.alpha_max)] {
            if !(a > 0.0 && a <= 2.0) {
                return Err(GwError::config(name, a, "in (0, 2]"));
            }
        }
        if self.alpha_min > self.alpha_max {
            return Err(GwError::config(
                "alpha_min",
                self.alpha_min,
                format!("<= alpha_max = {}", self.alpha_max),
            ));
        }

        positive("lambda", self.lambda)?;
        positive("kappa", self.kappa)?;
        positive("causal_resistance", self.causal_resistance)?;
        Ok(())
    }
}

/// Sum-of-exponentials memory solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Number of exponential terms R per kernel.
    pub rank: usize,
    /// Longest memory lag the kernel is fitted for (s).
    pub memory_horizon: f64,
    /// Shortest lag fitted; `None` uses the grid timestep.
    pub tau_min: Option<f64>,
    /// Kernels precomputed evenly across [alpha_min, alpha_max]; grid α
    /// values snap to the nearest of these.
    pub alpha_samples: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rank: 12,
            memory_horizon: 1.0,
            tau_min: None,
            alpha_samples: 20,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> GwResult<()> {
        if self.rank == 0 {
            return Err(GwError::config("rank", self.rank, ">= 1"));
        }
        positive("memory_horizon", self.memory_horizon)?;
        if let Some(t) = self.tau_min {
            positive("tau_min", t)?;
            if t >= self.memory_horizon {
                return Err(GwError::config(
                    "tau_min",
                    t,
                    format!("< memory_horizon = {}", self.memory_horizon),
                ));
            }
        }
        if self.alpha_samples == 0 {
            return Err(GwError::config("alpha_samples", self.alpha_samples, ">= 1"));
        }
        Ok(())
    }

    /// Fit window `[tau_min, tau_max]` given the grid timestep.
    pub fn fit_window(&self, dt: f64) -> (f64, f64) {
        let lo = self.tau_min.unwrap_or(dt).min(self.memory_horizon * 0.5);
        (lo, self.memory_horizon)
    }
}

/// Two-body source parameters. Masses are in solar masses, lengths in m.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    pub mass1: f64,
    pub mass2: f64,
    pub initial_separation: f64,
    pub initial_phase: f64,
    /// Orbital center; the orbit lies in the plane z = center.z.
    pub center: Vec3,
    /// Width σ of each body's Gaussian source blob.
    pub gaussian_width: f64,
    pub source_amplitude: f64,
    pub enable_inspiral: bool,
    /// Merger when separation <= horizon_order · R_s of the total mass.
    pub horizon_order: f64,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            mass1: 30.0,
            mass2: 30.0,
            initial_separation: 20e3,
            initial_phase: 0.0,
            center: Vec3::new(31_500.0, 31_500.0, 31_500.0),
            gaussian_width: 5e3,
            source_amplitude: 1.0,
            enable_inspiral: false,
            horizon_order: 2.0,
        }
    }
}

impl BinaryConfig {
    pub fn validate(&self) -> GwResult<()> {
        positive("mass1", self.mass1)?;
        positive("mass2", self.mass2)?;
        positive("initial_separation", self.initial_separation)?;
        if !self.initial_phase.is_finite() {
            return Err(GwError::config("initial_phase", self.initial_phase, "finite"));
        }
        if !self.center.is_finite() {
            return Err(GwError::config(
                "center",
                format!("{:?}", self.center),
                "finite coordinates",
            ));
        }
        positive("gaussian_width", self.gaussian_width)?;
        non_negative("source_amplitude", self.source_amplitude)?;
        positive("horizon_order", self.horizon_order)?;
        Ok(())
    }
}

/// Post-merger prime-gap echo parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// τ₀, the delay unit multiplied by each prime gap (s).
    pub fundamental_timescale: f64,
    pub max_echoes: usize,
    /// First gap used is between primes number `start` and `start + 1`.
    pub prime_start_index: usize,
    pub amplitude_base: f64,
    /// A_k = A₀·exp(−k / decay).
    pub amplitude_decay: f64,
    /// Frequency of echo 0 (Hz).
    pub frequency_base: f64,
    /// Added per echo index (Hz).
    pub frequency_shift: f64,
    /// Spatial σ of each echo pulse (m).
    pub gaussian_width: f64,
    /// Echo contributes while |t − t_k| < pulse_window · τ₀.
    pub pulse_window: f64,
    pub auto_detect_merger: bool,
    /// Field-energy level treated as merger when auto-detecting.
    pub detection_threshold: f64,
    /// Fixed merger time; overrides detection when set.
    pub merger_time: Option<f64>,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            fundamental_timescale: 0.001,
            max_echoes: 50,
            prime_start_index: 0,
            amplitude_base: 0.1,
            amplitude_decay: 10.0,
            frequency_base: 244.0,
            frequency_shift: 10.0,
            gaussian_width: 5000.0,
            pulse_window: 3.0,
            auto_detect_merger: true,
            detection_threshold: 1e9,
            merger_time: None,
        }
    }
}

impl EchoConfig {
    pub fn validate(&self) -> GwResult<()> {
        positive("fundamental_timescale", self.fundamental_timescale)?;
        non_negative("amplitude_base", self.amplitude_base)?;
        positive("amplitude_decay", self.amplitude_decay)?;
        positive("frequency_base", self.frequency_base)?;
        non_negative("frequency_shift", self.frequency_shift)?;
        positive("gaussian_width", self.gaussian_width)?;
        positive("pulse_window", self.pulse_window)?;
        positive("detection_threshold", self.detection_threshold)?;
        if let Some(t) = self.merger_time {
            non_negative("merger_time", t)?;
        }
        Ok(())
    }
}

/// Observer placement for strain extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub observer: Vec3,
    /// Distance from the orbital axis under which the observer is
    /// reported as on-axis (m).
    pub axis_tolerance: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            observer: Vec3::new(50_000.0, 31_500.0, 31_500.0),
            axis_tolerance: 1.0,
        }
    }
}

impl ProjectionConfig {
    pub fn validate(&self) -> GwResult<()> {
        if !self.observer.is_finite() {
            return Err(GwError::config(
                "observer",
                format!("{:?}", self.observer),
                "finite coordinates",
            ));
        }
        non_negative("axis_tolerance", self.axis_tolerance)
    }
}

/// Initial memory-order distribution over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlphaProfile {
    /// Same α everywhere.
    Uniform { alpha: f64 },
    /// α rises from alpha_min at the binary center to alpha_max far away.
    Radial,
}

/// Memory-free α = 2 everywhere.
impl Default for AlphaProfile {
    fn default() -> Self {
        AlphaProfile::Uniform { alpha: 2.0 }
    }
}

/// Top-level configuration for one simulation instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub solver: SolverConfig,
    pub binary: BinaryConfig,
    pub echo: EchoConfig,
    pub projection: ProjectionConfig,
    pub alpha_profile: AlphaProfile,
    /// Strain is sampled every this many steps.
    pub sample_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            solver: SolverConfig::default(),
            binary: BinaryConfig::default(),
            echo: EchoConfig::default(),
            projection: ProjectionConfig::default(),
            alpha_profile: AlphaProfile::default(),
            sample_interval: 1,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> GwResult<()> {
        self.grid.validate()?;
        self.solver.validate()?;
        self.binary.validate()?;
        self.echo.validate()?;
        self.projection.validate()?;

        if let AlphaProfile::Uniform { alpha } = self.alpha_profile {
            if !(self.grid.alpha_min..=self.grid.alpha_max).contains(&alpha) {
                return Err(GwError::config(
                    "alpha_profile.alpha",
                    alpha,
                    format!("in [{}, {}]", self.grid.alpha_min, self.grid.alpha_max),
                ));
            }
        }
        if self.sample_interval == 0 {
            return Err(GwError::config("sample_interval", self.sample_interval, ">= 1"));
        }

        let geometry = self.grid.geometry();
        if !geometry.contains_position(self.projection.observer) {
            let e = geometry.extent();
            return Err(GwError::config(
                "projection.observer",
                format!("{:?}", self.projection.observer),
                format!("inside [0, {}] x [0, {}] x [0, {}]", e[0], e[1], e[2]),
            ));
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> GwResult<Self> {
        serde_json::from_str(json).map_err(|e| GwError::Configuration {
            parameter: "json".into(),
            value: e.to_string(),
            valid: "a SimulationConfig document".into(),
        })
    }

    pub fn to_json(&self) -> GwResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GwError::Numerical(e.to_string()))
    }
}
