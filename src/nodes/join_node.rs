//! # Join Node
//!
//! Collects messages and emits one combined message.
//!
//! - `auto` mode reassembles sequences produced by a split (see
//!   [`SequenceCorrelator`]); members may arrive in any order.
//! - `merge` mode merges the payloads of every `count` messages into one map
//!   (see [`MergeCollector`]).
//!
//! Error messages are forwarded untouched so that downstream handlers see them.
//!
//! ## Configuration
//!
//! | property     | default  | meaning                                     |
//! |--------------|----------|---------------------------------------------|
//! | `mode`       | `"auto"` | `auto` or `merge`                           |
//! | `separator`  | `"\n"`   | joiner for string sequences, as in split    |
//! | `timeoutMs`  | none     | evict sequences incomplete after this long  |
//! | `maxPending` | 1024     | cap on open sequences                       |
//! | `count`      | 2        | messages per merge                          |

use crate::config::parse_node_config;
use crate::correlator::{DEFAULT_MAX_PENDING, MergeCollector, SequenceCorrelator};
use crate::error::{ConfigError, ExecutionError};
use crate::executor::{Executor, Output};
use crate::message::{Map, Message, Value};
use crate::nodes::split_node::DEFAULT_SEPARATOR;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JoinMode {
  #[default]
  Auto,
  Merge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JoinConfig {
  mode: JoinMode,
  separator: String,
  timeout_ms: Option<u64>,
  max_pending: usize,
  count: usize,
}

impl Default for JoinConfig {
  fn default() -> Self {
    Self {
      mode: JoinMode::Auto,
      separator: DEFAULT_SEPARATOR.to_string(),
      timeout_ms: None,
      max_pending: DEFAULT_MAX_PENDING,
      count: 2,
    }
  }
}

#[derive(Debug)]
enum Collector {
  Sequence(SequenceCorrelator),
  Merge(MergeCollector),
}

/// Sequence joiner.
#[derive(Debug)]
pub struct Join {
  collector: Collector,
}

impl Default for Join {
  fn default() -> Self {
    Self {
      collector: Collector::Sequence(SequenceCorrelator::new().with_separator(DEFAULT_SEPARATOR)),
    }
  }
}

impl Join {
  /// Number of incomplete sequences (auto mode) or collected messages (merge mode).
  pub fn pending(&self) -> usize {
    match &self.collector {
      Collector::Sequence(correlator) => correlator.pending(),
      Collector::Merge(merge) => merge.received(),
    }
  }
}

#[async_trait]
impl Executor for Join {
  async fn init(&mut self, config: &Map<String, Value>) -> Result<(), ConfigError> {
    let config: JoinConfig = parse_node_config(config)?;
    self.collector = match config.mode {
      JoinMode::Auto => {
        if config.max_pending == 0 {
          return Err(ConfigError::invalid("maxPending", "must be at least 1"));
        }
        let mut correlator = SequenceCorrelator::new()
          .with_separator(config.separator)
          .with_max_pending(config.max_pending);
        if let Some(ms) = config.timeout_ms {
          correlator = correlator.with_timeout(Duration::from_millis(ms));
        }
        Collector::Sequence(correlator)
      }
      JoinMode::Merge => {
        if config.count == 0 {
          return Err(ConfigError::invalid("count", "must be at least 1"));
        }
        Collector::Merge(MergeCollector::new(config.count))
      }
    };
    Ok(())
  }

  async fn execute(
    &self,
    _cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    if msg.is_error() {
      return Ok(Output::Single(msg));
    }
    let joined = match &self.collector {
      Collector::Sequence(correlator) => correlator.accept(msg)?,
      Collector::Merge(merge) => merge.accept(msg)?,
    };
    Ok(joined.into())
  }

  async fn cleanup(&self) -> Result<(), ExecutionError> {
    if let Collector::Sequence(correlator) = &self.collector {
      correlator.clear_all();
    }
    Ok(())
  }
}
