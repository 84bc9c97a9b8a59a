// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Core
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Evolution driver for the IGSOA gravitational-wave engine.
//!
//! A [`Simulation`] owns one field grid, its fractional memory, the
//! binary and echo sources and a strain projector, and advances them in
//! lock-step. Instances share nothing; several may run side by side.
//!
//! Re-exports the component crates so callers need a single dependency.

pub mod engine;

pub use engine::{RunSummary, Simulation, StepReport, MEMORY_STABILITY_LIMIT};

pub use igsoa_field as field;
pub use igsoa_observers as observers;
pub use igsoa_source as source;
pub use igsoa_types as types;

pub use igsoa_types::{GwError, GwResult, SimulationConfig, StrainSample};
