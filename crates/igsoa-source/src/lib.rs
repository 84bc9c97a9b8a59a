// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Sources
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Forcing terms for the symmetry field: an inspiralling binary before
//! merger and a train of prime-gap echoes after it.

pub mod binary;
pub mod echo;
pub mod primes;

pub use binary::{BinarySystem, OrbitState, C, G, M_SUN};
pub use echo::{EchoEvent, EchoGenerator, EchoSchedule};
pub use primes::{first_primes, prime_gaps, sieve, PrimeStats};
