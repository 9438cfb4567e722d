use thiserror::Error;

/// Configuration errors, raised once at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite and > 0 (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} = {value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error("Config parse error: {0}")]
    Parse(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
