// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Field
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! The simulated symmetry field and its fractional memory.
//!
//! - [`grid`]: 3D complex field δΦ with per-node memory order α,
//!   finite-difference operators, trilinear interpolation and the
//!   explicit timestep.
//! - [`kernel`]: sum-of-exponentials fits of the power-law memory kernel,
//!   cached in a shared [`KernelTable`].
//! - [`history`]: per-node exponential accumulators producing the
//!   fractional-derivative estimate in O(N·R) per step.
//! - [`special`]: reciprocal gamma, analytic kernel, Caputo power law,
//!   Mittag-Leffler series.

mod alloc;
pub mod grid;
pub mod history;
pub mod kernel;
pub mod special;

pub use alloc::{guarded_vec, LARGE_ALLOCATION_BYTES};
pub use grid::{potential, potential_derivative, FieldGrid};
pub use history::FractionalIntegrator;
pub use kernel::{check_order, KernelFitReport, KernelTable, SoeKernel};
pub use special::{caputo_power_law, fractional_kernel, mittag_leffler, recip_gamma};
