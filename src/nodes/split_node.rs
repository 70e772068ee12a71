//! # Split Node
//!
//! Breaks one message into a sequence of messages, one per element:
//!
//! - array payload: one member per item (`kind = array`)
//! - object payload: one member per entry, keyed (`kind = object`)
//! - string payload: one member per piece between separators (`kind = string`)
//!
//! Every member keeps the id, topic and metadata of the input and carries a
//! [`SequenceInfo`] under a fresh sequence id, so a downstream join can
//! reassemble it. Other payloads pass through unchanged; an empty array or
//! object produces nothing.
//!
//! ## Configuration
//!
//! | property    | default | meaning                      |
//! |-------------|---------|------------------------------|
//! | `separator` | `"\n"`  | delimiter for string payloads |

use crate::config::parse_node_config;
use crate::error::{ConfigError, ExecutionError};
use crate::executor::{Executor, Output};
use crate::message::{Map, Message, MessageId, SequenceInfo, SequenceKind, Value};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Separator shared by split and join when none is configured.
pub const DEFAULT_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SplitConfig {
  separator: String,
}

impl Default for SplitConfig {
  fn default() -> Self {
    Self {
      separator: DEFAULT_SEPARATOR.to_string(),
    }
  }
}

/// Sequence splitter.
#[derive(Debug, Default)]
pub struct Split {
  config: SplitConfig,
}

impl Split {
  /// A splitter using `separator` for string payloads.
  pub fn with_separator(separator: impl Into<String>) -> Self {
    Self {
      config: SplitConfig {
        separator: separator.into(),
      },
    }
  }

  fn members(&self, msg: &Message) -> Option<Vec<Message>> {
    let sequence_id = MessageId::new_uuid().to_string();
    let part = |index: usize, count: usize, kind: SequenceKind| {
      SequenceInfo::new(sequence_id.clone(), index, count, kind).with_length(count)
    };

    let members = match msg.payload() {
      Value::Array(items) => {
        let count = items.len();
        items
          .iter()
          .enumerate()
          .map(|(i, item)| msg.with_payload(item.clone()).with_parts(part(i, count, SequenceKind::Array)))
          .collect()
      }
      Value::Object(entries) => {
        let count = entries.len();
        entries
          .iter()
          .enumerate()
          .map(|(i, (key, value))| {
            msg
              .with_payload(value.clone())
              .with_parts(part(i, count, SequenceKind::Object).with_key(key.clone()))
          })
          .collect()
      }
      Value::String(text) => {
        let pieces: Vec<&str> = text.split(self.config.separator.as_str()).collect();
        let count = pieces.len();
        pieces
          .into_iter()
          .enumerate()
          .map(|(i, piece)| {
            msg
              .with_payload(Value::String(piece.to_string()))
              .with_parts(part(i, count, SequenceKind::String))
          })
          .collect()
      }
      _ => return None,
    };
    Some(members)
  }
}

#[async_trait]
impl Executor for Split {
  async fn init(&mut self, config: &Map<String, Value>) -> Result<(), ConfigError> {
    let config: SplitConfig = parse_node_config(config)?;
    if config.separator.is_empty() {
      return Err(ConfigError::invalid("separator", "must not be empty"));
    }
    self.config = config;
    Ok(())
  }

  async fn execute(
    &self,
    _cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    Ok(match self.members(&msg) {
      Some(members) => Output::Multiple(members),
      None => Output::Single(msg),
    })
  }
}
