// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Observers
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Observables extracted from the symmetry field: scalar mode, stress
//! tensor, causal flow and the two strain polarizations.

pub mod projection;

pub use projection::{
    causal_flow, distance_to_orbital_axis, Projector, StrainComponents, StrainReading,
    StressTensor,
};
