//! # Kernel Configuration
//!
//! Sizing knobs for the identity index and monitor pools, loaded once at
//! startup from TOML.
//!
//! ```toml
//! [sparse]
//! dense_capacity = 4096
//!
//! [monitors]
//! blocks_per_chunk = 64
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Top-level kernel configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Identity index sizing.
    pub sparse: SparseConfig,
    /// Change monitor pool sizing.
    pub monitors: MonitorConfig,
}

/// Sizing of sparse sets created by the kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SparseConfig {
    /// Dense ids reserved up front.
    pub dense_capacity: usize,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self { dense_capacity: 256 }
    }
}

/// Sizing of the block pools that hold change monitors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Monitor blocks reserved each time a pool grows.
    pub blocks_per_chunk: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            blocks_per_chunk: 32,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// Missing sections and fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown fields,
    /// and [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        tracing::debug!(
            "loaded kernel config: dense_capacity={}, blocks_per_chunk={}",
            config.sparse.dense_capacity,
            config.monitors.blocks_per_chunk
        );
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.monitors.blocks_per_chunk == 0 {
            return Err(ConfigError::Invalid {
                field: "monitors.blocks_per_chunk",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sparse.dense_capacity >= u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "sparse.dense_capacity",
                reason: format!("must be below {}", u32::MAX),
            });
        }
        Ok(())
    }
}
