// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Simulation (Evolution Driver)
// ─────────────────────────────────────────────────────────────────────
//! Per-step pipeline:
//!   1. Source: binary forcing, plus echoes once the schedule exists
//!   2. f'' ≈ (φⁿ − 2φⁿ⁻¹ + φⁿ⁻²)/dt², zero until three levels exist
//!   3. History update with f''
//!   4. Fractional derivative from the history
//!   5. Field step
//!   6. Orbit step
//!   7. Merger detection (orbital flag or field-energy threshold)
//!   8. Strain sample every `sample_interval` steps
//!
//! Any error halts the simulation until `reset`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use igsoa_field::{guarded_vec, FieldGrid, FractionalIntegrator, KernelTable};
use igsoa_observers::{Projector, StrainReading};
use igsoa_source::{BinarySystem, EchoGenerator, EchoSchedule};
use igsoa_types::{
    AlphaProfile, FieldSnapshot, FieldStats, GwError, GwResult, SimulationConfig, StrainSample,
    Vec3,
};

/// Above this the explicit memory feedback grows from step to step.
pub const MEMORY_STABILITY_LIMIT: f64 = 0.5;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Outcome of one `step()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u64,
    pub time: f64,
    pub total_energy: f64,
    pub max_amplitude: f64,
    pub separation: f64,
    pub merged: bool,
    /// The echo schedule was frozen during this step.
    pub merger_triggered: bool,
    pub active_echoes: usize,
    pub sample: Option<StrainSample>,
    pub on_symmetry_axis: Option<bool>,
}

/// Outcome of `run` / `run_until_cancelled`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: u64,
    pub cancelled: bool,
    pub final_time: f64,
    pub total_energy: f64,
    pub merger_time: Option<f64>,
    pub samples: usize,
}

/// One self-contained simulation instance.
pub struct Simulation {
    config: SimulationConfig,
    grid: FieldGrid,
    table: Arc<KernelTable>,
    integrator: FractionalIntegrator,
    binary: BinarySystem,
    echoes: EchoGenerator,
    projector: Projector,
    // Scratch, allocated once
    source: Vec<Complex64>,
    prev: Vec<Complex64>,
    prev2: Vec<Complex64>,
    second_derivative: Vec<Complex64>,
    /// Field levels available for the f'' estimate, at most 3.
    levels: usize,
    step: u64,
    samples: Vec<StrainSample>,
    halted: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> GwResult<Self> {
        config.validate()?;

        let mut grid = FieldGrid::new(config.grid.clone())?;
        let binary = BinarySystem::new(config.binary.clone())?;
        let dt = grid.dt();

        let table = Arc::new(KernelTable::from_config(&config.solver, dt)?);
        match config.alpha_profile {
            AlphaProfile::Uniform { alpha } => {
                grid.fill_alpha(alpha)?;
                table.precompute(&[alpha])?;
            }
            AlphaProfile::Radial => {
                grid.fill_alpha_radial(binary.center());
                table.precompute_range(
                    config.grid.alpha_min,
                    config.grid.alpha_max,
                    config.solver.alpha_samples,
                )?;
            }
        }
        let stability = table.max_stability_number(dt);
        if stability > MEMORY_STABILITY_LIMIT {
            log::warn!(
                "memory stability number {stability:.3e} exceeds {MEMORY_STABILITY_LIMIT} \
                 at dt = {dt:e}; the memory term will amplify (orders {:?})",
                table.alphas()
            );
        }

        let integrator = FractionalIntegrator::new(*grid.geometry(), Arc::clone(&table))?;

        let mut echoes = EchoGenerator::new(config.echo.clone())?;
        if let Some(t) = config.echo.merger_time {
            echoes.trigger(t);
        }
        let projector = Projector::new(config.projection.clone())?;

        let geometry = *grid.geometry();
        let n = grid.len();
        let source = guarded_vec("source buffer", n, ZERO, &geometry)?;
        let prev = guarded_vec("field history level", n, ZERO, &geometry)?;
        let prev2 = guarded_vec("field history level", n, ZERO, &geometry)?;
        let second_derivative = guarded_vec("second derivative", n, ZERO, &geometry)?;

        log::info!(
            "simulation ready: {}x{}x{} grid, dt = {:e}, rank {}, {} kernels, {} bytes",
            geometry.nx,
            geometry.ny,
            geometry.nz,
            dt,
            table.rank(),
            table.len(),
            grid.memory_usage_bytes() + integrator.memory_usage_bytes() + 4 * n * 16
        );

        Ok(Self {
            config,
            grid,
            table,
            integrator,
            binary,
            echoes,
            projector,
            source,
            prev,
            prev2,
            second_derivative,
            levels: 1,
            step: 0,
            samples: Vec::new(),
            halted: false,
        })
    }

    // ------------------------------------------------------------------
    // Step
    // ------------------------------------------------------------------

    /// Advance every component by one timestep.
    pub fn step(&mut self) -> GwResult<StepReport> {
        if self.halted {
            return Err(GwError::Numerical(format!(
                "simulation halted at step {} after an earlier error; reset to continue",
                self.step
            )));
        }
        let result = self.advance();
        if let Err(ref e) = result {
            log::error!("step {} failed: {e}", self.step + 1);
            self.halted = true;
        }
        result
    }

    fn advance(&mut self) -> GwResult<StepReport> {
        let dt = self.grid.dt();
        let t = self.grid.time();
        let geometry = *self.grid.geometry();
        let center = self.binary.center();

        // 1. Sources
        self.binary.compute_source(&geometry, &mut self.source)?;
        let active_echoes = self.echoes.active_echoes(t).count();
        if self.echoes.is_triggered() {
            self.echoes
                .add_echo_source(t, center, &geometry, &mut self.source)?;
        }

        // 2. Second time derivative
        if self.levels >= 3 {
            let inv_dt2 = 1.0 / (dt * dt);
            let (phi, prev, prev2) = (self.grid.field(), &self.prev, &self.prev2);
            self.second_derivative
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, f)| *f = (phi[i] - prev[i] * 2.0 + prev2[i]) * inv_dt2);
        }

        // 3. History
        self.integrator
            .update_history(&self.second_derivative, self.grid.alpha_field(), dt)?;

        // Rotate levels: prev2 ← φⁿ⁻¹, prev ← φⁿ
        std::mem::swap(&mut self.prev, &mut self.prev2);
        self.prev.copy_from_slice(self.grid.field());

        // 4–5. Fractional derivative and field step
        let fractional = self.integrator.compute_derivatives(self.grid.alpha_field())?;
        self.grid.evolve_step(fractional, &self.source)?;
        self.levels = (self.levels + 1).min(3);

        // 6. Orbit
        let was_triggered = self.echoes.is_triggered();
        if self.binary.evolve_orbit(dt)? {
            let merger = self.binary.merger_time().unwrap_or(self.grid.time());
            self.echoes.trigger(merger);
        }

        // 7. Energy threshold
        let stats = self.grid.statistics();
        self.echoes
            .detect_merger(stats.total_energy, self.grid.time());
        let merger_triggered = !was_triggered && self.echoes.is_triggered();

        self.step += 1;

        // 8. Strain
        let (sample, on_symmetry_axis) = if self.step % self.config.sample_interval as u64 == 0 {
            let reading = self.projector.strain_at_observer(&self.grid, center)?;
            let sample = reading.to_sample(self.grid.time());
            self.samples.push(sample);
            (Some(sample), Some(reading.on_symmetry_axis))
        } else {
            (None, None)
        };

        let report = StepReport {
            step: self.step,
            time: self.grid.time(),
            total_energy: stats.total_energy,
            max_amplitude: stats.max_amplitude,
            separation: self.binary.separation(),
            merged: self.binary.is_merged(),
            merger_triggered,
            active_echoes,
            sample,
            on_symmetry_axis,
        };
        log::debug!(
            "step {} t = {:.6e}: E = {:.3e}, |δΦ|max = {:.3e}, echoes = {}",
            report.step,
            report.time,
            report.total_energy,
            report.max_amplitude,
            report.active_echoes
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Run `n` steps, stopping at the first error.
    pub fn run(&mut self, n: u64) -> GwResult<RunSummary> {
        let never = AtomicBool::new(false);
        self.run_until_cancelled(n, &never)
    }

    /// Run up to `n` steps, checking `cancel` between steps.
    pub fn run_until_cancelled(&mut self, n: u64, cancel: &AtomicBool) -> GwResult<RunSummary> {
        let start = self.step;
        let mut cancelled = false;
        for _ in 0..n {
            if cancel.load(Ordering::SeqCst) {
                log::info!("run cancelled after {} steps", self.step - start);
                cancelled = true;
                break;
            }
            self.step()?;
        }
        Ok(RunSummary {
            steps: self.step - start,
            cancelled,
            final_time: self.grid.time(),
            total_energy: self.grid.total_energy(),
            merger_time: self.merger_time(),
            samples: self.samples.len(),
        })
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> FieldSnapshot {
        self.grid.snapshot(self.step)
    }

    pub fn samples(&self) -> &[StrainSample] {
        &self.samples
    }

    /// Drain the recorded samples.
    pub fn take_samples(&mut self) -> Vec<StrainSample> {
        std::mem::take(&mut self.samples)
    }

    pub fn samples_json(&self) -> GwResult<String> {
        serde_json::to_string(&self.samples).map_err(|e| GwError::Numerical(e.to_string()))
    }

    pub fn parse_samples(json: &str) -> GwResult<Vec<StrainSample>> {
        serde_json::from_str(json).map_err(|e| GwError::Configuration {
            parameter: "samples".into(),
            value: e.to_string(),
            valid: "JSON array of strain samples".into(),
        })
    }

    pub fn echo_schedule(&self) -> Option<&EchoSchedule> {
        self.echoes.schedule()
    }

    /// Merger time from whichever detector fired first.
    pub fn merger_time(&self) -> Option<f64> {
        self.echoes.merger_time().or(self.binary.merger_time())
    }

    pub fn statistics(&self) -> FieldStats {
        self.grid.statistics()
    }

    /// Strain at an arbitrary position, without recording a sample.
    pub fn strain_at(&self, position: Vec3) -> GwResult<StrainReading> {
        self.projector
            .strain_at(&self.grid, position, self.binary.center())
    }

    /// Strain at the configured observer, without recording a sample.
    pub fn observe(&self) -> GwResult<StrainReading> {
        self.projector
            .strain_at_observer(&self.grid, self.binary.center())
    }

    /// Largest memory stability number among the cached kernels.
    pub fn memory_stability(&self) -> f64 {
        self.table.max_stability_number(self.grid.dt())
    }

    /// Return to t = 0 with the same configuration and kernels.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.integrator.reset();
        self.binary.reset();
        self.echoes.reset();
        if let Some(t) = self.config.echo.merger_time {
            self.echoes.trigger(t);
        }
        for buf in [
            &mut self.source,
            &mut self.prev,
            &mut self.prev2,
            &mut self.second_derivative,
        ] {
            buf.iter_mut().for_each(|z| *z = ZERO);
        }
        self.levels = 1;
        self.step = 0;
        self.samples.clear();
        self.halted = false;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &FieldGrid {
        &self.grid
    }

    /// Mutable grid, for setting initial conditions.
    pub fn grid_mut(&mut self) -> &mut FieldGrid {
        &mut self.grid
    }

    pub fn kernel_table(&self) -> &Arc<KernelTable> {
        &self.table
    }

    pub fn integrator(&self) -> &FractionalIntegrator {
        &self.integrator
    }

    pub fn binary(&self) -> &BinarySystem {
        &self.binary
    }

    pub fn echoes(&self) -> &EchoGenerator {
        &self.echoes
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.grid.time()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
