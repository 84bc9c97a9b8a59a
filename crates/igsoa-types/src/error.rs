// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all engine failures.
///
/// Every variant carries enough context to identify the offending value
/// and, where one exists, the range it should have fallen in.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GwError {
    /// A configuration parameter is out of range.
    #[error("invalid {parameter} = {value}: must be {valid}")]
    Configuration {
        parameter: String,
        value: String,
        valid: String,
    },

    /// A buffer could not be allocated or its size overflows.
    #[error(
        "cannot allocate {what}: {required_bytes} bytes required for {nx}x{ny}x{nz} grid"
    )]
    ResourceExhausted {
        what: String,
        required_bytes: u128,
        nx: usize,
        ny: usize,
        nz: usize,
    },

    /// Grid indices outside the allocated array.
    #[error("index ({i}, {j}, {k}) out of bounds for {nx}x{ny}x{nz} grid")]
    Index {
        i: usize,
        j: usize,
        k: usize,
        nx: usize,
        ny: usize,
        nz: usize,
    },

    /// Physical position outside the interpolation domain.
    #[error(
        "position ({x}, {y}, {z}) outside grid domain [0, {}] x [0, {}] x [0, {}]",
        .extent[0], .extent[1], .extent[2]
    )]
    OutOfDomain {
        x: f64,
        y: f64,
        z: f64,
        extent: [f64; 3],
    },

    /// Fractional order outside (0, 2].
    #[error("fractional order alpha = {alpha} outside (0, 2]")]
    InvalidOrder { alpha: f64 },

    /// Buffer length does not match the grid.
    #[error("{what}: expected length {expected}, got {got}")]
    Shape {
        what: String,
        expected: usize,
        got: usize,
    },

    /// NaN/Inf encountered in an input or intermediate.
    #[error("numerical error: {0}")]
    Numerical(String),
}

impl GwError {
    /// Shorthand for [`GwError::Configuration`] that also emits the
    /// failure through the `log` facade.
    pub fn config(
        parameter: impl Into<String>,
        value: impl ToString,
        valid: impl Into<String>,
    ) -> Self {
        let err = GwError::Configuration {
            parameter: parameter.into(),
            value: value.to_string(),
            valid: valid.into(),
        };
        log::error!("{err}");
        err
    }

    pub fn shape(what: impl Into<String>, expected: usize, got: usize) -> Self {
        GwError::Shape {
            what: what.into(),
            expected,
            got,
        }
    }
}

pub type GwResult<T> = Result<T, GwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message_names_range() {
        let err = GwError::config("dt", 0.9, "<= 0.5 * min(dx, dy, dz) = 0.5");
        let msg = err.to_string();
        assert!(msg.contains("dt"));
        assert!(msg.contains("0.9"));
        assert!(msg.contains("0.5 * min"));
    }

    #[test]
    fn test_out_of_domain_message() {
        let err = GwError::OutOfDomain {
            x: 12.0,
            y: 1.0,
            z: 1.0,
            extent: [10.0, 10.0, 10.0],
        };
        assert!(err.to_string().contains("[0, 10]"));
    }

    #[test]
    fn test_resource_message_reports_bytes() {
        let err = GwError::ResourceExhausted {
            what: "field grid".into(),
            required_bytes: 1 << 40,
            nx: 4096,
            ny: 4096,
            nz: 4096,
        };
        assert!(err.to_string().contains("1099511627776"));
    }
}
