//! # Sequence Correlator
//!
//! Reassembles a split stream back into one aggregate message.
//!
//! [`SequenceCorrelator`] buffers members by `sequence_id`, writes each payload
//! into the slot named by its `index`, and emits exactly one aggregate once all
//! `count` members have arrived, assembled in index order whatever the arrival
//! order. Until then [`SequenceCorrelator::accept`] returns `Ok(None)`: "do not
//! forward", not an error.
//!
//! | kind     | aggregate                                         |
//! |----------|---------------------------------------------------|
//! | `array`  | list of payloads in index order                   |
//! | `object` | map of member `key` to payload                    |
//! | `string` | payloads joined by the configured separator       |
//! | `buffer` | concatenated bytes, as a list of byte values      |
//!
//! [`MergeCollector`] is the simpler mode: it ignores sequence information and
//! merges the payloads of a fixed number of arbitrary messages, last write wins.
//!
//! ## Eviction
//!
//! Every buffer remembers when it was opened. Buffers older than the optional
//! timeout are evicted on the next arrival (or by [`evict_expired`]); opening
//! a buffer beyond `max_pending` evicts the oldest one. Evicted partial
//! sequences are discarded and logged.
//!
//! A single lock guards the whole buffer map; sequences are independent but
//! briefly serialise on it.
//!
//! [`evict_expired`]: SequenceCorrelator::evict_expired

use crate::error::CorrelationError;
use crate::message::{Map, Message, SequenceKind, Value};
use crate::sync;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Default cap on simultaneously open sequences.
pub const DEFAULT_MAX_PENDING: usize = 1024;

#[derive(Debug)]
struct Slot {
  payload: Value,
  key: Option<String>,
}

#[derive(Debug)]
struct SequenceBuffer {
  kind: SequenceKind,
  slots: Vec<Option<Slot>>,
  received: usize,
  opened: Instant,
}

impl SequenceBuffer {
  fn new(kind: SequenceKind, count: usize, opened: Instant) -> Self {
    let mut slots = Vec::with_capacity(count);
    slots.resize_with(count, || None);
    Self {
      kind,
      slots,
      received: 0,
      opened,
    }
  }

  fn is_complete(&self) -> bool {
    self.received == self.slots.len()
  }
}

/// Per-node reassembly state for split sequences.
#[derive(Debug)]
pub struct SequenceCorrelator {
  separator: String,
  timeout: Option<Duration>,
  max_pending: usize,
  buffers: Mutex<HashMap<String, SequenceBuffer>>,
}

impl Default for SequenceCorrelator {
  fn default() -> Self {
    Self::new()
  }
}

impl SequenceCorrelator {
  /// A correlator with an empty string separator, no timeout and the default cap.
  pub fn new() -> Self {
    Self {
      separator: String::new(),
      timeout: None,
      max_pending: DEFAULT_MAX_PENDING,
      buffers: Mutex::new(HashMap::new()),
    }
  }

  /// Sets the separator used for `string` sequences.
  #[must_use]
  pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
    self.separator = separator.into();
    self
  }

  /// Evicts sequences left incomplete for longer than `timeout`.
  #[must_use]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Caps the number of open sequences (minimum one).
  #[must_use]
  pub fn with_max_pending(mut self, max_pending: usize) -> Self {
    self.max_pending = max_pending.max(1);
    self
  }

  /// Number of incomplete sequences held.
  pub fn pending(&self) -> usize {
    sync::lock(&self.buffers).len()
  }

  /// Discards the buffer of one sequence. Returns whether it existed.
  pub fn clear(&self, sequence_id: &str) -> bool {
    sync::lock(&self.buffers).remove(sequence_id).is_some()
  }

  /// Discards every buffer.
  pub fn clear_all(&self) {
    sync::lock(&self.buffers).clear();
  }

  /// Evicts expired buffers now; returns their sequence ids.
  pub fn evict_expired(&self) -> Vec<String> {
    let mut buffers = sync::lock(&self.buffers);
    self.evict_expired_locked(&mut buffers, Instant::now())
  }

  /// Records one member; returns the aggregate when it completes its sequence.
  ///
  /// The aggregate keeps the id, topic and metadata of the completing member
  /// and carries no sequence information. A rejected member leaves the buffer
  /// untouched, except when assembly itself fails, which discards the sequence.
  pub fn accept(&self, mut msg: Message) -> Result<Option<Message>, CorrelationError> {
    let parts = msg.take_parts().ok_or(CorrelationError::MissingParts)?;
    trace!(sequence = %parts.sequence_id, index = parts.index, count = parts.count, "SequenceCorrelator::accept()");

    if parts.count == 0 {
      return Err(CorrelationError::EmptySequence(parts.sequence_id));
    }
    if !parts.is_valid() {
      return Err(CorrelationError::IndexOutOfRange {
        sequence_id: parts.sequence_id,
        index: parts.index,
        count: parts.count,
      });
    }
    if parts.kind == SequenceKind::Object && parts.key.is_none() {
      return Err(CorrelationError::MissingKey {
        sequence_id: parts.sequence_id,
        index: parts.index,
      });
    }

    let now = Instant::now();
    let mut buffers = sync::lock(&self.buffers);
    self.evict_expired_locked(&mut buffers, now);

    if !buffers.contains_key(&parts.sequence_id) && buffers.len() >= self.max_pending {
      evict_oldest(&mut buffers);
    }
    let buffer = buffers
      .entry(parts.sequence_id.clone())
      .or_insert_with(|| SequenceBuffer::new(parts.kind, parts.count, now));

    if buffer.slots.len() != parts.count {
      return Err(CorrelationError::CountMismatch {
        sequence_id: parts.sequence_id,
        expected: buffer.slots.len(),
        found: parts.count,
      });
    }
    let slot = &mut buffer.slots[parts.index];
    if slot.is_some() {
      return Err(CorrelationError::DuplicateIndex {
        sequence_id: parts.sequence_id,
        index: parts.index,
      });
    }
    *slot = Some(Slot {
      payload: msg.payload().clone(),
      key: parts.key,
    });
    buffer.received += 1;

    if !buffer.is_complete() {
      return Ok(None);
    }
    let Some(buffer) = buffers.remove(&parts.sequence_id) else {
      return Ok(None);
    };
    drop(buffers);

    let aggregate = assemble(&parts.sequence_id, buffer, &self.separator)?;
    Ok(Some(msg.with_payload(aggregate)))
  }

  fn evict_expired_locked(
    &self,
    buffers: &mut HashMap<String, SequenceBuffer>,
    now: Instant,
  ) -> Vec<String> {
    let Some(timeout) = self.timeout else {
      return Vec::new();
    };
    let expired: Vec<String> = buffers
      .iter()
      .filter(|(_, b)| now.duration_since(b.opened) >= timeout)
      .map(|(id, _)| id.clone())
      .collect();
    for id in &expired {
      if let Some(buffer) = buffers.remove(id) {
        warn!(sequence = %id, received = buffer.received, count = buffer.slots.len(), "evicted expired sequence");
      }
    }
    expired
  }
}

fn evict_oldest(buffers: &mut HashMap<String, SequenceBuffer>) {
  let oldest = buffers
    .iter()
    .min_by_key(|(_, b)| b.opened)
    .map(|(id, _)| id.clone());
  if let Some(id) = oldest {
    if let Some(buffer) = buffers.remove(&id) {
      warn!(sequence = %id, received = buffer.received, count = buffer.slots.len(), "pending limit reached, evicted oldest sequence");
    }
  }
}

fn assemble(
  sequence_id: &str,
  buffer: SequenceBuffer,
  separator: &str,
) -> Result<Value, CorrelationError> {
  let slots = buffer.slots.into_iter().flatten();
  match buffer.kind {
    SequenceKind::Array => Ok(Value::Array(slots.map(|s| s.payload).collect())),
    SequenceKind::Object => {
      let mut map = Map::new();
      for slot in slots {
        // keys were checked on arrival
        if let Some(key) = slot.key {
          map.insert(key, slot.payload);
        }
      }
      Ok(Value::Object(map))
    }
    SequenceKind::String => {
      let pieces: Vec<String> = slots
        .map(|s| match s.payload {
          Value::String(text) => text,
          other => other.to_string(),
        })
        .collect();
      Ok(Value::String(pieces.join(separator)))
    }
    SequenceKind::Buffer => {
      let mut bytes = Vec::new();
      for slot in slots {
        bytes.extend(payload_bytes(&slot.payload).map_err(|reason| {
          CorrelationError::Unassemblable {
            sequence_id: sequence_id.to_string(),
            reason,
          }
        })?);
      }
      Ok(Value::Array(bytes.into_iter().map(Value::from).collect()))
    }
  }
}

/// Raw bytes of a buffer member: a string's UTF-8 bytes or a list of byte values.
fn payload_bytes(payload: &Value) -> Result<Vec<u8>, String> {
  match payload {
    Value::String(text) => Ok(text.as_bytes().to_vec()),
    Value::Array(items) => items
      .iter()
      .map(|item| {
        item
          .as_u64()
          .and_then(|b| u8::try_from(b).ok())
          .ok_or_else(|| format!("{} is not a byte value", item))
      })
      .collect(),
    other => Err(format!("{} is not a byte buffer", other)),
  }
}

#[derive(Debug, Default)]
struct MergeState {
  merged: Map<String, Value>,
  received: usize,
}

/// Merges the payloads of every `count` messages into one map.
///
/// Object payloads contribute their entries; any other payload is stored under
/// the message topic. Later writes to a key win.
#[derive(Debug)]
pub struct MergeCollector {
  count: usize,
  state: Mutex<MergeState>,
}

impl MergeCollector {
  /// A collector emitting after every `count` messages (minimum one).
  pub fn new(count: usize) -> Self {
    Self {
      count: count.max(1),
      state: Mutex::new(MergeState::default()),
    }
  }

  /// Messages collected towards the next emission.
  pub fn received(&self) -> usize {
    sync::lock(&self.state).received
  }

  /// Merges one message; returns the merged message every `count` arrivals.
  pub fn accept(&self, mut msg: Message) -> Result<Option<Message>, CorrelationError> {
    msg.take_parts();
    let mut state = sync::lock(&self.state);
    match msg.payload() {
      Value::Object(entries) => {
        for (key, value) in entries {
          state.merged.insert(key.clone(), value.clone());
        }
      }
      other => {
        let key = msg.topic().ok_or(CorrelationError::NotMergeable)?;
        state.merged.insert(key.to_string(), other.clone());
      }
    }
    state.received += 1;

    if state.received < self.count {
      return Ok(None);
    }
    let merged = std::mem::take(&mut *state);
    drop(state);
    Ok(Some(msg.with_payload(Value::Object(merged.merged))))
  }
}
