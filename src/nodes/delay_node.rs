//! # Delay Node
//!
//! Holds each message for `delayMs` (default 1000) before forwarding it. The
//! wait races the node's cancellation, so stopping the node drops the
//! message being held.

use crate::config::parse_node_config;
use crate::error::{ConfigError, ExecutionError};
use crate::executor::{Executor, Output};
use crate::message::{Map, Message, Value};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DelayConfig {
  delay_ms: u64,
}

impl Default for DelayConfig {
  fn default() -> Self {
    Self { delay_ms: 1000 }
  }
}

/// Fixed delay.
#[derive(Debug, Default)]
pub struct Delay {
  config: DelayConfig,
}

impl Delay {
  /// Configured delay.
  pub fn delay(&self) -> Duration {
    Duration::from_millis(self.config.delay_ms)
  }
}

#[async_trait]
impl Executor for Delay {
  async fn init(&mut self, config: &Map<String, Value>) -> Result<(), ConfigError> {
    self.config = parse_node_config(config)?;
    Ok(())
  }

  async fn execute(
    &self,
    cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
      _ = tokio::time::sleep(self.delay()) => Ok(Output::Single(msg)),
    }
  }
}
