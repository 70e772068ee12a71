//! # Processing Unit Contract
//!
//! [`Executor`] is the seam between the runtime and every concrete node
//! implementation. The runtime consumes executors polymorphically: a
//! [`Registry`](crate::registry::Registry) factory produces one, a
//! [`Node`](crate::node::Node) wraps it in a delivery task.
//!
//! Lifecycle, as driven by `Node::start` / `Node::stop`:
//!
//! 1. `init(config)` – validate and absorb configuration (fail fast)
//! 2. `attach(ctx)` – receive the [`NodeContext`] for out-of-band emission
//! 3. `execute(cancel, msg)` – once per inbound message, on the node's task
//! 4. `cleanup()` – teardown after the delivery task has exited
//!
//! `execute` may suspend (timers, rate-limit waits); any such wait must race
//! the supplied cancellation token so that `Node::stop` unblocks it.

use crate::error::{ConfigError, ExecutionError};
use crate::message::{Map, Message, Value};
use crate::node::{Downstream, NodeHandle};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// What one `execute` call produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Output {
  /// Nothing to forward (join still collecting, message queued, sink).
  #[default]
  Nothing,
  /// One message to broadcast.
  Single(Message),
  /// Several messages to broadcast, in order.
  Multiple(Vec<Message>),
}

impl Output {
  /// Returns true when there is nothing to forward.
  pub fn is_nothing(&self) -> bool {
    match self {
      Output::Nothing => true,
      Output::Single(_) => false,
      Output::Multiple(msgs) => msgs.is_empty(),
    }
  }

  /// Flattens the output into the messages to broadcast.
  pub fn into_messages(self) -> Vec<Message> {
    match self {
      Output::Nothing => Vec::new(),
      Output::Single(msg) => vec![msg],
      Output::Multiple(msgs) => msgs,
    }
  }
}

impl From<Message> for Output {
  fn from(msg: Message) -> Self {
    Output::Single(msg)
  }
}

impl From<Option<Message>> for Output {
  fn from(msg: Option<Message>) -> Self {
    msg.map_or(Output::Nothing, Output::Single)
  }
}

impl From<Vec<Message>> for Output {
  fn from(msgs: Vec<Message>) -> Self {
    Output::Multiple(msgs)
  }
}

/// Runtime facilities handed to an executor when its node starts.
///
/// Cloneable; executors that emit outside `execute` (queue drains, timers)
/// keep a copy for as long as the node runs.
#[derive(Clone)]
pub struct NodeContext {
  node_id: String,
  inbox: NodeHandle,
  downstream: Downstream,
  cancel: CancellationToken,
}

impl NodeContext {
  pub(crate) fn new(
    node_id: String,
    inbox: NodeHandle,
    downstream: Downstream,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      node_id,
      inbox,
      downstream,
      cancel,
    }
  }

  /// Id of the node this context belongs to.
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  /// The node's own inbound queue.
  pub fn inbox(&self) -> &NodeHandle {
    &self.inbox
  }

  /// The node's cancellation scope for this run.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Broadcasts `msg` to the node's downstream targets without blocking.
  ///
  /// Returns the number of targets that accepted the message.
  pub fn emit(&self, msg: Message) -> usize {
    self.downstream.broadcast(&self.node_id, msg)
  }
}

/// A pluggable processing unit.
#[async_trait]
pub trait Executor: Send + Sync {
  /// Validates and absorbs the node configuration.
  ///
  /// Called on every `Node::start`, before the delivery task exists.
  async fn init(&mut self, _config: &Map<String, Value>) -> Result<(), ConfigError> {
    Ok(())
  }

  /// Receives the runtime context after a successful `init`.
  fn attach(&self, _ctx: NodeContext) {}

  /// Processes one inbound message.
  ///
  /// Errors become error messages broadcast downstream; they never reach the
  /// sender of the original message.
  async fn execute(
    &self,
    cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError>;

  /// Releases resources after the node stopped.
  async fn cleanup(&self) -> Result<(), ExecutionError> {
    Ok(())
  }
}

/// Executor that forwards every message unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Executor for PassThrough {
  async fn execute(
    &self,
    _cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    Ok(Output::Single(msg))
  }
}
