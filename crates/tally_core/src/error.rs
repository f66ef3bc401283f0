//! # Core Error Types
//!
//! Errors raised while building kernel state. Runtime operations on ids and
//! monitors never fail; they report through return values.

use thiserror::Error;

/// Errors that can occur while loading kernel configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration text is not valid TOML for [`crate::KernelConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
