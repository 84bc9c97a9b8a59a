// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Prime-Gap Echo Generator
// ─────────────────────────────────────────────────────────────────────
//! Post-merger echoes whose delays follow the prime gaps.
//!
//! Echo k (1-based) arrives at
//!
//!   t_k = T_merger + τ₀ · Σ_{i<k} gap_{start+i}
//!
//! with amplitude A₀·exp(−k/decay) and frequency f₀ + k·Δf. Each echo is
//! a Gaussian pulse in time (σ = 2τ₀) and space, carrying the phase
//! exp(i·2π·f_k·(t − t_k)).

use std::f64::consts::TAU;

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use igsoa_types::{EchoConfig, GridGeometry, GwError, GwResult, Vec3};

use crate::primes::{first_primes, prime_gaps, PrimeStats};

/// One scheduled echo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EchoEvent {
    /// 1-based echo number.
    pub index: usize,
    pub time: f64,
    pub amplitude: f64,
    pub frequency: f64,
    pub prime_gap: u64,
    /// Index of the lower prime of the gap (0 → the gap 3 − 2).
    pub prime_index: usize,
}

/// Immutable echo schedule for one merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoSchedule {
    pub merger_time: f64,
    pub events: Vec<EchoEvent>,
}

impl EchoSchedule {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.time).collect()
    }
}

pub struct EchoGenerator {
    config: EchoConfig,
    gaps: Vec<u64>,
    schedule: Option<EchoSchedule>,
    last_energy: Option<f64>,
}

impl EchoGenerator {
    pub fn new(config: EchoConfig) -> GwResult<Self> {
        config.validate()?;
        let gaps = Self::gaps_for(&config, config.max_echoes);
        log::debug!(
            "echo generator: {} gaps from prime #{}, tau0 = {} s",
            gaps.len(),
            config.prime_start_index,
            config.fundamental_timescale
        );
        Ok(Self {
            config,
            gaps,
            schedule: None,
            last_energy: None,
        })
    }

    fn gaps_for(config: &EchoConfig, count: usize) -> Vec<u64> {
        if count == 0 {
            return Vec::new();
        }
        let primes = first_primes(config.prime_start_index + count + 1);
        prime_gaps(&primes[config.prime_start_index..]).into_iter().take(count).collect()
    }

    pub fn config(&self) -> &EchoConfig {
        &self.config
    }

    /// Gaps used for the configured echo count.
    pub fn gaps(&self) -> &[u64] {
        &self.gaps
    }

    pub fn prime_stats(&self) -> PrimeStats {
        PrimeStats::from_gaps(&self.gaps)
    }

    /// Pure schedule construction; does not trigger the generator.
    pub fn build_schedule(&self, merger_time: f64, max_count: usize) -> EchoSchedule {
        let extended;
        let gaps = if max_count <= self.gaps.len() {
            &self.gaps[..max_count]
        } else {
            extended = Self::gaps_for(&self.config, max_count);
            &extended[..]
        };

        let c = &self.config;
        let mut delay_units = 0u64;
        let events = gaps
            .iter()
            .enumerate()
            .map(|(n, &gap)| {
                delay_units += gap;
                let k = n + 1;
                EchoEvent {
                    index: k,
                    time: merger_time + c.fundamental_timescale * delay_units as f64,
                    amplitude: c.amplitude_base * (-(k as f64) / c.amplitude_decay).exp(),
                    frequency: c.frequency_base + k as f64 * c.frequency_shift,
                    prime_gap: gap,
                    prime_index: c.prime_start_index + n,
                }
            })
            .collect();
        EchoSchedule {
            merger_time,
            events,
        }
    }

    /// Freeze the schedule at `merger_time`. Later calls keep the first one.
    pub fn trigger(&mut self, merger_time: f64) -> &EchoSchedule {
        if self.schedule.is_none() {
            let schedule = self.build_schedule(merger_time, self.config.max_echoes);
            log::info!(
                "merger at t = {merger_time:.6} s: {} echoes scheduled, first at {:?}",
                schedule.len(),
                schedule.events.first().map(|e| e.time)
            );
            self.schedule = Some(schedule);
        } else {
            log::debug!("echo schedule already frozen; ignoring trigger at t = {merger_time}");
        }
        self.schedule.get_or_insert_with(|| EchoSchedule {
            merger_time,
            events: Vec::new(),
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn schedule(&self) -> Option<&EchoSchedule> {
        self.schedule.as_ref()
    }

    pub fn merger_time(&self) -> Option<f64> {
        self.schedule.as_ref().map(|s| s.merger_time)
    }

    /// Energy-threshold merger detector. Fires once, on the first sample
    /// at or above the threshold that follows one below it.
    pub fn detect_merger(&mut self, field_energy: f64, time: f64) -> bool {
        let previous = self.last_energy.replace(field_energy);
        if !self.config.auto_detect_merger || self.is_triggered() {
            return false;
        }
        let threshold = self.config.detection_threshold;
        let crossed = field_energy >= threshold && previous.map_or(true, |e| e < threshold);
        if crossed {
            log::info!("field energy {field_energy:.3e} crossed merger threshold {threshold:.3e}");
            self.trigger(time);
        }
        crossed
    }

    fn half_window(&self) -> f64 {
        self.config.pulse_window * self.config.fundamental_timescale
    }

    /// Echoes whose pulse window contains `time`.
    pub fn active_echoes(&self, time: f64) -> impl Iterator<Item = &EchoEvent> {
        let window = self.half_window();
        self.schedule
            .iter()
            .flat_map(|s| s.events.iter())
            .filter(move |e| (time - e.time).abs() < window)
    }

    /// First echo arriving strictly after `time`.
    pub fn next_echo(&self, time: f64) -> Option<&EchoEvent> {
        self.schedule
            .as_ref()
            .and_then(|s| s.events.iter().find(|e| e.time > time))
    }

    /// Complex temporal factor A_k·exp(−Δt²/2(2τ₀)²)·exp(i2πf_kΔt).
    pub fn envelope(&self, event: &EchoEvent, time: f64) -> Complex64 {
        let dt = time - event.time;
        let sigma_t = 2.0 * self.config.fundamental_timescale;
        let mag = event.amplitude * (-dt * dt / (2.0 * sigma_t * sigma_t)).exp();
        Complex64::from_polar(mag, TAU * event.frequency * dt)
    }

    fn temporal_sum(&self, time: f64) -> Complex64 {
        self.active_echoes(time)
            .map(|e| self.envelope(e, time))
            .sum()
    }

    fn spatial(&self, x: Vec3, center: Vec3) -> f64 {
        let sigma = self.config.gaussian_width;
        (-(x - center).norm_sq() / (2.0 * sigma * sigma)).exp()
    }

    /// Echo source at one point; zero before the schedule is triggered.
    pub fn echo_source_at(&self, time: f64, x: Vec3, center: Vec3) -> Complex64 {
        self.temporal_sum(time) * self.spatial(x, center)
    }

    /// Add the echo source at every grid node into `out`.
    pub fn add_echo_source(
        &self,
        time: f64,
        center: Vec3,
        geometry: &GridGeometry,
        out: &mut [Complex64],
    ) -> GwResult<()> {
        if out.len() != geometry.len() {
            return Err(GwError::shape("echo source buffer", geometry.len(), out.len()));
        }
        let temporal = self.temporal_sum(time);
        if temporal == Complex64::new(0.0, 0.0) {
            return Ok(());
        }
        let g = *geometry;
        out.par_iter_mut().enumerate().for_each(|(idx, v)| {
            let (i, j, k) = g.unflatten(idx);
            *v += temporal * self.spatial(g.position(i, j, k), center);
        });
        Ok(())
    }

    /// Forget the schedule and detector state.
    pub fn reset(&mut self) {
        self.schedule = None;
        self.last_energy = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> EchoGenerator {
        EchoGenerator::new(EchoConfig::default()).unwrap()
    }

    #[test]
    fn test_echo_times_follow_prime_gaps() {
        let g = generator();
        let s = g.build_schedule(0.5, 9);
        let gaps: Vec<u64> = s.events.iter().map(|e| e.prime_gap).collect();
        assert_eq!(gaps, vec![1, 2, 2, 4, 2, 4, 2, 4, 6]);
        let expected = [1.0, 3.0, 5.0, 9.0, 11.0, 15.0, 17.0, 21.0, 27.0];
        for (e, units) in s.events.iter().zip(expected) {
            assert!((e.time - (0.5 + 0.001 * units)).abs() < 1e-12, "{e:?}");
        }
    }

    #[test]
    fn test_start_index_shifts_gaps() {
        let cfg = EchoConfig {
            prime_start_index: 3,
            max_echoes: 4,
            ..EchoConfig::default()
        };
        let g = EchoGenerator::new(cfg).unwrap();
        // Primes from 7: 7, 11, 13, 17, 19.
        assert_eq!(g.gaps(), &[4, 2, 4, 2]);
        let s = g.build_schedule(0.0, 4);
        assert_eq!(s.events[0].prime_index, 3);
        assert!((s.events[3].time - 0.012).abs() < 1e-12);
    }

    #[test]
    fn test_amplitude_and_frequency_progression() {
        let g = generator();
        let s = g.build_schedule(0.0, 5);
        for e in &s.events {
            let k = e.index as f64;
            assert!((e.amplitude - 0.1 * (-k / 10.0).exp()).abs() < 1e-15);
            assert!((e.frequency - (244.0 + 10.0 * k)).abs() < 1e-12);
        }
        assert!(s.events.windows(2).all(|w| w[1].amplitude < w[0].amplitude));
    }

    #[test]
    fn test_schedule_beyond_cached_gaps() {
        let cfg = EchoConfig {
            max_echoes: 3,
            ..EchoConfig::default()
        };
        let g = EchoGenerator::new(cfg).unwrap();
        assert_eq!(g.build_schedule(0.0, 10).len(), 10);
        assert!(g.build_schedule(0.0, 0).is_empty());
    }

    #[test]
    fn test_zero_echo_count() {
        let cfg = EchoConfig {
            max_echoes: 0,
            ..EchoConfig::default()
        };
        let mut g = EchoGenerator::new(cfg).unwrap();
        assert!(g.trigger(1.0).is_empty());
        assert_eq!(g.echo_source_at(1.001, Vec3::ZERO, Vec3::ZERO), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_trigger_freezes_schedule() {
        let mut g = generator();
        let first = g.trigger(0.2).clone();
        let second = g.trigger(0.9).clone();
        assert_eq!(first, second);
        assert_eq!(g.merger_time(), Some(0.2));
    }

    #[test]
    fn test_no_source_before_trigger() {
        let g = generator();
        assert_eq!(g.echo_source_at(0.001, Vec3::ZERO, Vec3::ZERO), Complex64::new(0.0, 0.0));
        assert!(g.next_echo(0.0).is_none());
    }

    #[test]
    fn test_overlapping_echoes_superpose() {
        let mut g = generator();
        g.trigger(0.0);
        // At t = 3 ms echoes at 1, 3 and 5 ms are all inside ±3 ms.
        let t = 0.003;
        let active: Vec<EchoEvent> = g.active_echoes(t).copied().collect();
        assert_eq!(active.iter().map(|e| e.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        let manual: Complex64 = active.iter().map(|e| g.envelope(e, t)).sum();
        let got = g.echo_source_at(t, Vec3::ZERO, Vec3::ZERO);
        assert!((got - manual).norm() < 1e-15);
        // Peak echo 2 dominates the centered envelope.
        assert!((g.envelope(&active[1], t).norm() - active[1].amplitude).abs() < 1e-15);
    }

    #[test]
    fn test_source_outside_windows_is_zero() {
        let mut g = generator();
        g.trigger(0.0);
        let last = g.schedule().unwrap().events.last().unwrap().time;
        assert_eq!(
            g.echo_source_at(last + 1.0, Vec3::ZERO, Vec3::ZERO),
            Complex64::new(0.0, 0.0)
        );
        assert_eq!(g.echo_source_at(-1.0, Vec3::ZERO, Vec3::ZERO), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_spatial_falloff() {
        let mut g = generator();
        g.trigger(0.0);
        let c = Vec3::new(10e3, 10e3, 10e3);
        let near = g.echo_source_at(0.001, c, c).norm();
        let far = g.echo_source_at(0.001, c + Vec3::new(5000.0, 0.0, 0.0), c).norm();
        assert!((far / near - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_next_echo() {
        let mut g = generator();
        g.trigger(1.0);
        assert_eq!(g.next_echo(0.0).unwrap().index, 1);
        assert_eq!(g.next_echo(1.001).unwrap().index, 2);
    }

    #[test]
    fn test_energy_detection_fires_once() {
        let cfg = EchoConfig {
            detection_threshold: 10.0,
            ..EchoConfig::default()
        };
        let mut g = EchoGenerator::new(cfg).unwrap();
        assert!(!g.detect_merger(1.0, 0.1));
        assert!(!g.detect_merger(9.9, 0.2));
        assert!(g.detect_merger(10.5, 0.3));
        assert!(!g.detect_merger(20.0, 0.4));
        assert_eq!(g.merger_time(), Some(0.3));
    }

    #[test]
    fn test_detection_disabled() {
        let cfg = EchoConfig {
            auto_detect_merger: false,
            detection_threshold: 1.0,
            ..EchoConfig::default()
        };
        let mut g = EchoGenerator::new(cfg).unwrap();
        assert!(!g.detect_merger(5.0, 0.1));
        assert!(!g.is_triggered());
    }

    #[test]
    fn test_add_echo_source_shape_checked() {
        let geometry = GridGeometry {
            nx: 3,
            ny: 3,
            nz: 3,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        };
        let mut g = generator();
        g.trigger(0.0);
        let mut out = vec![Complex64::new(1.0, 0.0); 27];
        g.add_echo_source(0.001, geometry.center(), &geometry, &mut out)
            .unwrap();
        let center = geometry.flat_index(1, 1, 1);
        let expected = Complex64::new(1.0, 0.0) + g.echo_source_at(0.001, geometry.center(), geometry.center());
        assert!((out[center] - expected).norm() < 1e-12);
        assert!(matches!(
            g.add_echo_source(0.001, Vec3::ZERO, &geometry, &mut out[..2]),
            Err(GwError::Shape { .. })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let cfg = EchoConfig {
            gaussian_width: 0.0,
            ..EchoConfig::default()
        };
        assert!(matches!(
            EchoGenerator::new(cfg),
            Err(GwError::Configuration { .. })
        ));
    }
}
