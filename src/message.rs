//! Message envelope types flowing between nodes.
//!
//! Every edge in a flow carries a [`Message`]. Payloads are [`Value`]s, a closed
//! tagged union of null, bool, number, string, ordered list and ordered map, so
//! node implementations pattern-match instead of downcasting.
//!
//! # Overview
//!
//! - [`MessageId`]: identity of a logical message, stable across clones
//! - [`SequenceInfo`]: correlation data for messages produced by one split
//! - [`StructuredError`]: error information carried by error messages
//! - [`Message`]: the envelope itself
//!
//! # Example
//!
//! ```rust
//! use edgeflow::message::{Message, MessageKind};
//! use serde_json::json;
//!
//! let msg = Message::new(json!({"temperature": 21.5})).with_topic("sensors/kitchen");
//! let branch = msg.clone();
//!
//! assert_eq!(msg.id(), branch.id());
//! assert_eq!(msg.kind(), MessageKind::Data);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

pub use serde_json::{Map, Value};

/// Identity of a logical message.
///
/// Cloning a [`Message`] keeps its id, so branches of one message can be
/// recognised downstream (completion and catch style nodes rely on this).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageId {
  /// A random UUIDv4-shaped identifier (128-bit).
  Uuid(u128),

  /// A sequence-based identifier (64-bit).
  Sequence(u64),

  /// A custom string identifier.
  Custom(String),
}

impl MessageId {
  /// Create a new random UUIDv4 message id.
  #[must_use]
  pub fn new_uuid() -> Self {
    let raw: u128 = rand::random();
    // version 4, RFC 4122 variant
    let uuid = (raw & !(0xF << 76) & !(0x3 << 62)) | (0x4 << 76) | (0x2 << 62);
    MessageId::Uuid(uuid)
  }

  /// Create a sequence-based message id.
  #[must_use]
  pub const fn new_sequence(seq: u64) -> Self {
    MessageId::Sequence(seq)
  }

  /// Create a custom message id from a string.
  #[must_use]
  pub fn new_custom(id: impl Into<String>) -> Self {
    MessageId::Custom(id.into())
  }

  /// Returns true if this is a UUID-based id.
  #[must_use]
  pub const fn is_uuid(&self) -> bool {
    matches!(self, MessageId::Uuid(_))
  }
}

impl Display for MessageId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      MessageId::Uuid(uuid) => write!(
        f,
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (uuid >> 96) as u32,
        (uuid >> 80) as u16,
        (uuid >> 64) as u16,
        (uuid >> 48) as u16,
        (uuid & 0xFFFF_FFFF_FFFF) as u64
      ),
      MessageId::Sequence(seq) => write!(f, "seq:{}", seq),
      MessageId::Custom(id) => write!(f, "custom:{}", id),
    }
  }
}

impl Default for MessageId {
  fn default() -> Self {
    MessageId::new_uuid()
  }
}

/// What a message represents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
  /// Ordinary data.
  #[default]
  Data,
  /// A failure converted into data; `error` is populated.
  Error,
  /// A lifecycle or control event.
  Event,
}

/// Shape of the value a sequence was split from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
  /// Members are list elements; reassembled as a list.
  Array,
  /// Members are map entries; reassembled as a map keyed by `key`.
  Object,
  /// Members are string fragments; reassembled by joining with a separator.
  String,
  /// Members are raw byte chunks; reassembled by concatenation.
  Buffer,
}

/// Correlation data attached to each message produced by one split.
///
/// A well-formed member satisfies `index < count`, and exactly one message per
/// index is expected for a given `sequence_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInfo {
  /// Identifier shared by every member of the sequence.
  pub sequence_id: String,
  /// Zero-based position of this member.
  pub index: usize,
  /// Total number of members.
  pub count: usize,
  /// Shape of the original value.
  pub kind: SequenceKind,
  /// Map key of this member, for `Object` sequences.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
  /// Length of the original value, when known.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub length: Option<usize>,
}

impl SequenceInfo {
  /// Creates sequence information for one member.
  pub fn new(sequence_id: impl Into<String>, index: usize, count: usize, kind: SequenceKind) -> Self {
    Self {
      sequence_id: sequence_id.into(),
      index,
      count,
      kind,
      key: None,
      length: None,
    }
  }

  /// Sets the map key of this member.
  #[must_use]
  pub fn with_key(mut self, key: impl Into<String>) -> Self {
    self.key = Some(key.into());
    self
  }

  /// Sets the length of the original value.
  #[must_use]
  pub fn with_length(mut self, length: usize) -> Self {
    self.length = Some(length);
    self
  }

  /// Returns true when `index` lies inside `0..count`.
  pub fn is_valid(&self) -> bool {
    self.index < self.count
  }
}

/// Severity of a [`StructuredError`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  /// Recoverable, informational.
  Warn,
  /// The message could not be processed.
  #[default]
  Error,
  /// The node cannot continue to operate correctly.
  Fatal,
}

/// The node an error originated from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
  /// Id of the failing node.
  pub node_id: String,
  /// Registered type name of the failing node.
  pub node_type: String,
  /// Display name of the failing node.
  pub node_name: String,
  /// How many failures the node had seen, this one included.
  pub occurrence_count: u64,
}

/// Error information carried by [`MessageKind::Error`] messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
  /// Human readable description.
  pub message: String,
  /// Originating node, when known.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<ErrorSource>,
  /// Optional backtrace or cause chain.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stack: Option<String>,
  /// Machine readable code, e.g. `rate_limit_exceeded`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  /// Severity.
  #[serde(default)]
  pub severity: Severity,
  /// When the error was recorded.
  pub timestamp: DateTime<Utc>,
}

impl StructuredError {
  /// Creates an error with the given description and `Error` severity.
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      source: None,
      stack: None,
      code: None,
      severity: Severity::Error,
      timestamp: Utc::now(),
    }
  }

  /// Sets the originating node.
  #[must_use]
  pub fn with_source(mut self, source: ErrorSource) -> Self {
    self.source = Some(source);
    self
  }

  /// Sets the machine readable code.
  #[must_use]
  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }

  /// Sets the cause chain.
  #[must_use]
  pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
    self.stack = Some(stack.into());
    self
  }

  /// Sets the severity.
  #[must_use]
  pub fn with_severity(mut self, severity: Severity) -> Self {
    self.severity = severity;
    self
  }
}

impl Display for StructuredError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match &self.source {
      Some(source) => write!(f, "{} (node {})", self.message, source.node_id),
      None => write!(f, "{}", self.message),
    }
  }
}

/// The envelope flowing between nodes.
///
/// A plain message has no `parts` and empty `metadata`; split, join and routing
/// nodes populate those fields. `Clone` duplicates data but keeps the `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
  id: MessageId,
  kind: MessageKind,
  payload: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  topic: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  parts: Option<SequenceInfo>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  error: Option<StructuredError>,
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  metadata: Map<String, Value>,
}

impl Message {
  /// Creates a data message with a fresh id.
  pub fn new(payload: Value) -> Self {
    Self {
      id: MessageId::new_uuid(),
      kind: MessageKind::Data,
      payload,
      topic: None,
      parts: None,
      error: None,
      metadata: Map::new(),
    }
  }

  /// Creates an event message with a fresh id.
  pub fn event(payload: Value) -> Self {
    Self {
      kind: MessageKind::Event,
      ..Self::new(payload)
    }
  }

  /// Creates an error message carrying `error`. The payload holds the error text.
  pub fn error(error: StructuredError) -> Self {
    Self {
      kind: MessageKind::Error,
      payload: Value::String(error.message.clone()),
      error: Some(error),
      ..Self::new(Value::Null)
    }
  }

  /// Turns this message into an error message carrying `error`.
  ///
  /// Keeps the id, payload, topic and metadata; drops sequence information.
  #[must_use]
  pub fn into_error(self, error: StructuredError) -> Self {
    Self {
      kind: MessageKind::Error,
      parts: None,
      error: Some(error),
      ..self
    }
  }

  /// Replaces the id.
  #[must_use]
  pub fn with_id(mut self, id: MessageId) -> Self {
    self.id = id;
    self
  }

  /// Sets the topic.
  #[must_use]
  pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
    self.topic = Some(topic.into());
    self
  }

  /// Sets the sequence information.
  #[must_use]
  pub fn with_parts(mut self, parts: SequenceInfo) -> Self {
    self.parts = Some(parts);
    self
  }

  /// Inserts a metadata entry.
  #[must_use]
  pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
    self.metadata.insert(key.into(), value);
    self
  }

  /// Returns a copy of this message with another payload and the same id.
  pub fn with_payload(&self, payload: Value) -> Self {
    Self {
      payload,
      ..self.clone()
    }
  }

  /// Assigns a fresh identity; the result is no longer "the same message".
  pub fn renew_id(&mut self) {
    self.id = MessageId::new_uuid();
  }

  /// Returns the id.
  pub fn id(&self) -> &MessageId {
    &self.id
  }

  /// Returns the kind.
  pub fn kind(&self) -> MessageKind {
    self.kind
  }

  /// Returns true for error messages.
  pub fn is_error(&self) -> bool {
    self.kind == MessageKind::Error
  }

  /// Returns the payload.
  pub fn payload(&self) -> &Value {
    &self.payload
  }

  /// Returns the payload mutably.
  pub fn payload_mut(&mut self) -> &mut Value {
    &mut self.payload
  }

  /// Consumes the message and returns the payload.
  pub fn into_payload(self) -> Value {
    self.payload
  }

  /// Returns the topic.
  pub fn topic(&self) -> Option<&str> {
    self.topic.as_deref()
  }

  /// Returns the sequence information.
  pub fn parts(&self) -> Option<&SequenceInfo> {
    self.parts.as_ref()
  }

  /// Removes and returns the sequence information.
  pub fn take_parts(&mut self) -> Option<SequenceInfo> {
    self.parts.take()
  }

  /// Returns the structured error of an error message.
  pub fn error_info(&self) -> Option<&StructuredError> {
    self.error.as_ref()
  }

  /// Returns the metadata map.
  pub fn metadata(&self) -> &Map<String, Value> {
    &self.metadata
  }

  /// Returns the metadata map mutably.
  pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
    &mut self.metadata
  }
}

impl Default for Message {
  fn default() -> Self {
    Message::new(Value::Null)
  }
}

impl From<Value> for Message {
  fn from(payload: Value) -> Self {
    Message::new(payload)
  }
}
