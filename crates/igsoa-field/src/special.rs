// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Special Functions
// ─────────────────────────────────────────────────────────────────────
//! Gamma-function helpers and closed forms used to check the
//! sum-of-exponentials memory kernel.
//!
//!   K_α(τ)           = τ^(1−2α) / Γ(2−2α)
//!   D^α t^β          = Γ(β+1) / Γ(β−α+1) · t^(β−α)
//!   E_{a,b}(z)       = Σ_k z^k / Γ(a·k + b)

use statrs::function::gamma::{gamma, ln_gamma};

/// 1/Γ(x), exactly zero at the poles x = 0, −1, −2, …
pub fn recip_gamma(x: f64) -> f64 {
    if x <= 0.0 && x.fract() == 0.0 {
        return 0.0;
    }
    if x > 171.0 {
        return 0.0;
    }
    1.0 / gamma(x)
}

/// Analytic memory kernel τ^(1−2α)/Γ(2−2α).
///
/// Vanishes identically when Γ(2−2α) has a pole (α = 1, 1.5, 2).
pub fn fractional_kernel(alpha: f64, tau: f64) -> f64 {
    let c = recip_gamma(2.0 - 2.0 * alpha);
    if c == 0.0 {
        return 0.0;
    }
    c * tau.powf(1.0 - 2.0 * alpha)
}

/// Caputo derivative of order α of f(t) = t^β.
pub fn caputo_power_law(alpha: f64, beta: f64, t: f64) -> f64 {
    gamma(beta + 1.0) * recip_gamma(beta - alpha + 1.0) * t.powf(beta - alpha)
}

/// Two-parameter Mittag-Leffler function by direct series.
///
/// Accurate for moderate |z| (a few tens); both parameters must be > 0.
pub fn mittag_leffler(a: f64, b: f64, z: f64) -> f64 {
    if z == 0.0 {
        return recip_gamma(b);
    }
    let ln_abs_z = z.abs().ln();
    let mut sum = recip_gamma(b);
    for k in 1..2000 {
        let kf = k as f64;
        let log_mag = kf * ln_abs_z - ln_gamma(a * kf + b);
        let term = if z < 0.0 && k % 2 == 1 {
            -log_mag.exp()
        } else {
            log_mag.exp()
        };
        sum += term;
        if term.abs() <= 1e-17 * sum.abs().max(1e-300) && kf * a > z.abs() {
            break;
        }
    }
    sum
}
