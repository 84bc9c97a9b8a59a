// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Configuration, geometry, error hierarchy and sample records shared by
//! every crate of the IGSOA gravitational-wave engine.

pub mod config;
pub mod error;
pub mod geometry;
pub mod sample;

pub use config::{
    AlphaProfile, BinaryConfig, EchoConfig, GridConfig, ProjectionConfig, SimulationConfig,
    SolverConfig,
};
pub use error::{GwError, GwResult};
pub use geometry::{GridGeometry, Vec3};
pub use sample::{FieldSnapshot, FieldStats, StrainSample};
