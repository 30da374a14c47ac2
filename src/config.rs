//! Router configuration
//!
//! Validated settings consumed at construction time, with builder support
//! and JSON round-tripping for embedding in host application config.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid configuration: {field} - {reason}")]
    Validation {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Configuration JSON could not be read or written.
    #[error("serialization error: {source}")]
    Serialization {
        /// The underlying serde failure.
        #[from]
        source: serde_json::Error,
    },
}

/// Human-readable name configured for an end point.
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into,
        AsRef
    )
)]
pub struct EndpointName(String);

/// Complete router configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Address assigned to routers created without an explicit one.
    pub default_end_point: EndpointName,
}

impl RouterConfig {
    /// Creates a configuration with the stock default end-point name.
    ///
    /// # Panics
    /// Never: the hardcoded name passes validation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_end_point: EndpointName::try_new("default-end-point".to_string())
                .expect("stock end-point name is valid"),
        }
    }

    /// Creates a configuration with a process-unique default end-point name,
    /// for hosts that run several routers side by side.
    #[must_use]
    pub fn with_unique_end_point() -> Self {
        Self {
            default_end_point: EndpointName::try_new(format!("end-point-{}", Uuid::new_v4()))
                .expect("generated end-point name is valid"),
        }
    }

    /// Starts building a custom configuration.
    #[must_use]
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// Reads a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the configuration as JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`RouterConfig`].
#[derive(Debug, Default)]
pub struct RouterConfigBuilder {
    default_end_point: Option<String>,
}

impl RouterConfigBuilder {
    /// Sets the default end-point name.
    #[must_use]
    pub fn default_end_point(mut self, name: impl Into<String>) -> Self {
        self.default_end_point = Some(name.into());
        self
    }

    /// Validates the settings and produces the configuration.
    pub fn build(self) -> Result<RouterConfig, ConfigError> {
        let name = self
            .default_end_point
            .unwrap_or_else(|| "default-end-point".to_string());
        let default_end_point =
            EndpointName::try_new(name).map_err(|error| ConfigError::Validation {
                field: "default_end_point".to_string(),
                reason: error.to_string(),
            })?;
        Ok(RouterConfig { default_end_point })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_configuration_is_valid() {
        let config = RouterConfig::default();
        assert_eq!(config.default_end_point.as_ref(), "default-end-point");
    }

    #[test]
    fn builder_rejects_empty_name() {
        let result = RouterConfig::builder().default_end_point("").build();
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn builder_accepts_custom_name() {
        let config = RouterConfig::builder()
            .default_end_point("orders")
            .build()
            .unwrap();
        assert_eq!(config.default_end_point.as_ref(), "orders");
    }

    #[test]
    fn unique_names_do_not_collide() {
        let a = RouterConfig::with_unique_end_point();
        let b = RouterConfig::with_unique_end_point();
        assert_ne!(a.default_end_point, b.default_end_point);
    }

    #[test]
    fn json_round_trip() {
        let config = RouterConfig::builder()
            .default_end_point("orders")
            .build()
            .unwrap();
        let json = config.to_json().unwrap();
        assert_eq!(RouterConfig::from_json(&json).unwrap(), config);
    }
}
