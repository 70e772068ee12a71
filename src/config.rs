//! # Configuration
//!
//! Two layers:
//!
//! - [`RuntimeConfig`]: process-level knobs read once at startup (queue
//!   capacities). Built with `Default` plus builder methods, or deserialised
//!   from JSON.
//! - Node configuration: every node carries a `Map<String, Value>`. Executors
//!   turn it into a typed struct with [`parse_node_config`] inside `init`.
//!
//! ## Example
//!
//! ```rust
//! use edgeflow::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json_str(r#"{"queueCapacity": 64}"#).unwrap();
//! assert_eq!(config.queue_capacity, 64);
//! ```

use crate::error::ConfigError;
use crate::message::{Map, Value};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Default bound of every node's inbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Process-level runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
  /// Inbound queue bound of nodes created by a registry.
  pub queue_capacity: usize,
  /// Bound of observation queues opened by a flow.
  pub drain_capacity: usize,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      drain_capacity: DEFAULT_QUEUE_CAPACITY,
    }
  }
}

impl RuntimeConfig {
  /// Sets the inbound queue bound.
  #[must_use]
  pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
    self.queue_capacity = capacity;
    self
  }

  /// Sets the observation queue bound.
  #[must_use]
  pub fn with_drain_capacity(mut self, capacity: usize) -> Self {
    self.drain_capacity = capacity;
    self
  }

  /// Parses a JSON document; missing fields keep their defaults.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Rejects zero capacities.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.queue_capacity == 0 {
      return Err(ConfigError::invalid("queueCapacity", "must be at least 1"));
    }
    if self.drain_capacity == 0 {
      return Err(ConfigError::invalid("drainCapacity", "must be at least 1"));
    }
    Ok(())
  }
}

/// Deserialises a node configuration map into `T`.
///
/// `T` is normally declared with `#[serde(rename_all = "camelCase", default)]`
/// so that absent properties fall back to defaults.
pub fn parse_node_config<T: DeserializeOwned>(config: &Map<String, Value>) -> Result<T, ConfigError> {
  Ok(serde_json::from_value(Value::Object(config.clone()))?)
}
