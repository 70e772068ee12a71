//! # Node Runtime
//!
//! A [`Node`] wraps one [`Executor`] in an actor: a bounded inbound queue, one
//! tokio task that drains it, and a fan-out list of downstream queues.
//!
//! ## Delivery semantics
//!
//! - [`Node::send`] never blocks. It fails with [`SendError::Stopped`] once the
//!   node's cancellation has fired and with [`SendError::BufferFull`] when the
//!   queue is at capacity. Cancellation is checked first, so a stopped node
//!   with a full queue reports `Stopped`.
//! - Results are broadcast to every downstream queue with the same
//!   non-blocking semantics. Each target succeeds or drops independently;
//!   a partial fan-out is not rolled back.
//! - An `execute` failure sets the node to [`NodeStatus::Error`] and
//!   broadcasts a synthesized error [`Message`] instead. The task keeps running.
//!   A unit giving up on a wait because the node itself is stopping is not a
//!   failure; its message is dropped.
//!
//! ## Ordering
//!
//! Messages from one sender keep FIFO order in the inbound queue. Nothing is
//! promised across senders or across fan-out targets.
//!
//! ## Example
//!
//! ```rust,no_run
//! use edgeflow::executor::PassThrough;
//! use edgeflow::message::Message;
//! use edgeflow::node::Node;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let a = Node::new("a", "pass", "A", "core", Box::new(PassThrough), 16);
//! let b = Node::new("b", "pass", "B", "core", Box::new(PassThrough), 16);
//! a.connect(&b);
//!
//! let root = CancellationToken::new();
//! b.start(&root).await?;
//! a.start(&root).await?;
//! a.send(Message::new(json!(1)))?;
//!
//! a.stop().await?;
//! b.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{NodeError, SendError};
use crate::executor::{Executor, NodeContext};
use crate::message::{ErrorSource, Map, Message, StructuredError, Value};
use crate::sync;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Lifecycle status of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
  /// Created or stopped; no delivery task.
  #[default]
  Idle,
  /// Delivery task active.
  Running,
  /// `init` failed, or an `execute` call failed since the last start.
  Error,
}

/// Snapshot of a node's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
  /// Messages `execute` accepted without error.
  pub processed: u64,
  /// Messages `execute` failed on.
  pub failed: u64,
  /// Downstream deliveries dropped (target full or stopped).
  pub dropped: u64,
}

/// Producer side of a node's inbound queue.
///
/// Cloned into upstream fan-out lists and Link-In registrations. Sees the
/// node's current cancellation scope, so it reports `Stopped` as soon as the
/// node stops, and accepts again after a restart.
#[derive(Clone, Debug)]
pub struct NodeHandle {
  node_id: Arc<str>,
  sender: mpsc::Sender<Message>,
  cancel: Arc<RwLock<CancellationToken>>,
}

impl NodeHandle {
  /// Id of the node behind this handle.
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  /// Attempts to enqueue `msg` without waiting for capacity.
  pub fn try_deliver(&self, msg: Message) -> Result<(), SendError> {
    if self.is_stopped() {
      return Err(SendError::Stopped);
    }
    match self.sender.try_send(msg) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => Err(SendError::BufferFull),
      Err(TrySendError::Closed(_)) => Err(SendError::Stopped),
    }
  }

  /// Returns true once the node's cancellation has fired.
  pub fn is_stopped(&self) -> bool {
    sync::read(&self.cancel).is_cancelled()
  }

  fn token(&self) -> CancellationToken {
    sync::read(&self.cancel).clone()
  }

  fn replace_token(&self, token: CancellationToken) {
    *sync::write(&self.cancel) = token;
  }
}

#[derive(Clone, Debug)]
enum Target {
  Node(NodeHandle),
  Observer(mpsc::Sender<Message>),
}

/// Shared fan-out list of a node.
#[derive(Clone, Debug, Default)]
pub(crate) struct Downstream {
  targets: Arc<RwLock<Vec<Target>>>,
  dropped: Arc<AtomicU64>,
}

impl Downstream {
  fn push(&self, target: Target) {
    sync::write(&self.targets).push(target);
  }

  fn remove_node(&self, node_id: &str) -> bool {
    let mut targets = sync::write(&self.targets);
    let before = targets.len();
    targets.retain(|t| !matches!(t, Target::Node(h) if h.node_id() == node_id));
    targets.len() != before
  }

  /// Delivers a copy of `msg` to every target; returns how many accepted it.
  pub(crate) fn broadcast(&self, origin: &str, msg: Message) -> usize {
    let targets = sync::read(&self.targets).clone();
    let mut delivered = 0;
    for target in targets {
      let result = match &target {
        Target::Node(handle) => handle.try_deliver(msg.clone()),
        Target::Observer(tx) => tx.try_send(msg.clone()).map_err(|e| match e {
          TrySendError::Full(_) => SendError::BufferFull,
          TrySendError::Closed(_) => SendError::Stopped,
        }),
      };
      match result {
        Ok(()) => delivered += 1,
        Err(err) => {
          self.dropped.fetch_add(1, Ordering::Relaxed);
          let to = match &target {
            Target::Node(handle) => handle.node_id().to_string(),
            Target::Observer(_) => "<observer>".to_string(),
          };
          debug!(node = %origin, target = %to, error = %err, "dropped downstream message");
        }
      }
    }
    delivered
  }
}

#[derive(Debug, Default)]
struct NodeState {
  status: RwLock<NodeStatus>,
  last_error: RwLock<Option<String>>,
  config: RwLock<Map<String, Value>>,
  processed: AtomicU64,
  failed: AtomicU64,
}

impl NodeState {
  fn set_status(&self, status: NodeStatus) {
    *sync::write(&self.status) = status;
  }

  fn record_error(&self, error: String) {
    *sync::write(&self.status) = NodeStatus::Error;
    *sync::write(&self.last_error) = Some(error);
  }
}

type SharedExecutor = Arc<tokio::sync::RwLock<Box<dyn Executor>>>;

/// A runtime node: one processing unit, one inbound queue, one delivery task.
pub struct Node {
  id: String,
  type_name: String,
  display_name: String,
  category: String,
  executor: SharedExecutor,
  state: Arc<NodeState>,
  inbox: NodeHandle,
  receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Message>>>,
  downstream: Downstream,
  outputs: RwLock<Vec<String>>,
  inputs: RwLock<Vec<String>>,
  task: Mutex<Option<JoinHandle<()>>>,
  active: AtomicBool,
}

impl Node {
  /// Creates an idle node around `executor` with an inbound queue of `capacity`.
  ///
  /// A zero capacity is raised to one.
  pub fn new(
    id: impl Into<String>,
    type_name: impl Into<String>,
    display_name: impl Into<String>,
    category: impl Into<String>,
    executor: Box<dyn Executor>,
    capacity: usize,
  ) -> Self {
    let id = id.into();
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let inbox = NodeHandle {
      node_id: Arc::from(id.as_str()),
      sender,
      cancel: Arc::new(RwLock::new(CancellationToken::new())),
    };
    Self {
      id,
      type_name: type_name.into(),
      display_name: display_name.into(),
      category: category.into(),
      executor: Arc::new(tokio::sync::RwLock::new(executor)),
      state: Arc::new(NodeState::default()),
      inbox,
      receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
      downstream: Downstream::default(),
      outputs: RwLock::new(Vec::new()),
      inputs: RwLock::new(Vec::new()),
      task: Mutex::new(None),
      active: AtomicBool::new(false),
    }
  }

  /// Node id.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Registered type name.
  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  /// Display name.
  pub fn display_name(&self) -> &str {
    &self.display_name
  }

  /// Category inherited from the descriptor.
  pub fn category(&self) -> &str {
    &self.category
  }

  /// Current status.
  pub fn status(&self) -> NodeStatus {
    *sync::read(&self.state.status)
  }

  /// Description of the most recent failure, if any.
  pub fn last_error(&self) -> Option<String> {
    sync::read(&self.state.last_error).clone()
  }

  /// Whether the delivery task is active.
  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::SeqCst)
  }

  /// Counter snapshot.
  pub fn stats(&self) -> NodeStats {
    NodeStats {
      processed: self.state.processed.load(Ordering::Relaxed),
      failed: self.state.failed.load(Ordering::Relaxed),
      dropped: self.downstream.dropped.load(Ordering::Relaxed),
    }
  }

  /// Copy of the configuration passed to `init` on the next start.
  pub fn config(&self) -> Map<String, Value> {
    sync::read(&self.state.config).clone()
  }

  /// Sets one configuration property. Takes effect on the next start.
  pub fn set_config(&self, key: impl Into<String>, value: Value) {
    sync::write(&self.state.config).insert(key.into(), value);
  }

  /// Replaces the configuration. Takes effect on the next start.
  pub fn replace_config(&self, config: Map<String, Value>) {
    *sync::write(&self.state.config) = config;
  }

  /// A handle to this node's inbound queue.
  pub fn handle(&self) -> NodeHandle {
    self.inbox.clone()
  }

  /// Ids of nodes this node fans out to.
  pub fn outputs(&self) -> Vec<String> {
    sync::read(&self.outputs).clone()
  }

  /// Ids of nodes that fan out to this node.
  pub fn inputs(&self) -> Vec<String> {
    sync::read(&self.inputs).clone()
  }

  /// Adds `target` to this node's fan-out. Records the edge on both sides;
  /// delivers nothing.
  pub fn connect(&self, target: &Node) {
    trace!(node = %self.id, target = %target.id, "Node::connect()");
    self.downstream.push(Target::Node(target.handle()));
    sync::write(&self.outputs).push(target.id.clone());
    sync::write(&target.inputs).push(self.id.clone());
  }

  /// Removes every edge from this node to `target`. Returns whether one existed.
  pub fn disconnect(&self, target: &Node) -> bool {
    let removed = self.downstream.remove_node(&target.id);
    if removed {
      sync::write(&self.outputs).retain(|id| id != &target.id);
      sync::write(&target.inputs).retain(|id| id != &self.id);
    }
    removed
  }

  /// Registers an observation queue as an extra downstream target and
  /// returns its receiving end. Full observers drop like any other target.
  pub fn output_stream(&self, capacity: usize) -> ReceiverStream<Message> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    self.downstream.push(Target::Observer(tx));
    ReceiverStream::new(rx)
  }

  /// Enqueues `msg` without blocking.
  pub fn send(&self, msg: Message) -> Result<(), SendError> {
    self.inbox.try_deliver(msg)
  }

  /// Starts the node under a child scope of `parent`.
  ///
  /// Runs `init` with the current configuration, hands the executor its
  /// [`NodeContext`] and spawns the delivery task. Must be called within a
  /// tokio runtime.
  pub async fn start(&self, parent: &CancellationToken) -> Result<(), NodeError> {
    trace!(node = %self.id, "Node::start()");
    if self.active.swap(true, Ordering::SeqCst) {
      return Err(NodeError::AlreadyRunning(self.id.clone()));
    }

    let token = parent.child_token();
    self.inbox.replace_token(token.clone());

    let config = self.config();
    let init = self.executor.write().await.init(&config).await;
    if let Err(source) = init {
      warn!(node = %self.id, error = %source, "node failed to initialise");
      self.state.record_error(source.to_string());
      token.cancel();
      self.active.store(false, Ordering::SeqCst);
      return Err(NodeError::Init {
        node: self.id.clone(),
        source,
      });
    }

    let ctx = NodeContext::new(
      self.id.clone(),
      self.inbox.clone(),
      self.downstream.clone(),
      token.clone(),
    );
    self.executor.read().await.attach(ctx);

    let delivery = Delivery {
      node_id: self.id.clone(),
      type_name: self.type_name.clone(),
      display_name: self.display_name.clone(),
      executor: Arc::clone(&self.executor),
      state: Arc::clone(&self.state),
      receiver: Arc::clone(&self.receiver),
      downstream: self.downstream.clone(),
      cancel: token,
    };
    self.state.set_status(NodeStatus::Running);
    *sync::write(&self.state.last_error) = None;
    let handle = tokio::spawn(delivery.run());
    *sync::lock(&self.task) = Some(handle);
    debug!(node = %self.id, node_type = %self.type_name, "node started");
    Ok(())
  }

  /// Stops the node. Idempotent.
  ///
  /// Cancels the node scope (unblocking a cooperative wait inside the current
  /// `execute`), waits for the delivery task, then runs `cleanup`. A failed
  /// delivery task is reported ahead of a failed cleanup.
  pub async fn stop(&self) -> Result<(), NodeError> {
    trace!(node = %self.id, "Node::stop()");
    self.inbox.token().cancel();
    if !self.active.swap(false, Ordering::SeqCst) {
      return Ok(());
    }

    let handle = sync::lock(&self.task).take();
    let joined = match handle {
      Some(handle) => handle.await.map_err(|e| NodeError::Task {
        node: self.id.clone(),
        reason: e.to_string(),
      }),
      None => Ok(()),
    };

    let cleanup = self.executor.read().await.cleanup().await;
    match (joined, cleanup) {
      (Ok(()), Ok(())) => {
        self.state.set_status(NodeStatus::Idle);
        debug!(node = %self.id, "node stopped");
        Ok(())
      }
      (Err(task_err), cleanup) => {
        if let Err(source) = cleanup {
          warn!(node = %self.id, error = %source, "cleanup failed after delivery task failure");
        }
        self.state.record_error(task_err.to_string());
        Err(task_err)
      }
      (Ok(()), Err(source)) => {
        self.state.record_error(source.to_string());
        Err(NodeError::Cleanup {
          node: self.id.clone(),
          source,
        })
      }
    }
  }
}

impl std::fmt::Debug for Node {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Node")
      .field("id", &self.id)
      .field("type_name", &self.type_name)
      .field("display_name", &self.display_name)
      .field("status", &self.status())
      .finish()
  }
}

/// Everything the delivery task needs, detached from the `Node` borrow.
struct Delivery {
  node_id: String,
  type_name: String,
  display_name: String,
  executor: SharedExecutor,
  state: Arc<NodeState>,
  receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Message>>>,
  downstream: Downstream,
  cancel: CancellationToken,
}

impl Delivery {
  async fn run(self) {
    let mut receiver = self.receiver.lock().await;
    loop {
      let msg = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => break,
        next = receiver.recv() => match next {
          Some(msg) => msg,
          None => break,
        },
      };
      self.process(msg).await;
    }
    trace!(node = %self.node_id, "delivery loop exited");
  }

  async fn process(&self, msg: Message) {
    let origin = msg.id().clone();
    let topic = msg.topic().map(str::to_owned);

    let result = {
      let unit = self.executor.read().await;
      unit.execute(&self.cancel, msg).await
    };

    match result {
      Ok(output) => {
        self.state.processed.fetch_add(1, Ordering::Relaxed);
        for out in output.into_messages() {
          self.downstream.broadcast(&self.node_id, out);
        }
      }
      Err(err) if err.is_cancelled() && self.cancel.is_cancelled() => {
        trace!(node = %self.node_id, "message dropped on shutdown");
      }
      Err(err) => {
        let occurrence_count = self.state.failed.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(node = %self.node_id, error = %err, "execution failed");
        self.state.record_error(err.to_string());

        let info = StructuredError::new(err.to_string())
          .with_code(err.code())
          .with_source(ErrorSource {
            node_id: self.node_id.clone(),
            node_type: self.type_name.clone(),
            node_name: self.display_name.clone(),
            occurrence_count,
          });
        // a rejected message travels on with its payload and annotations
        let error_msg = match err.into_rejected() {
          Some(rejected) => rejected.into_error(info),
          None => {
            let error_msg = Message::error(info).with_id(origin);
            match topic {
              Some(topic) => error_msg.with_topic(topic),
              None => error_msg,
            }
          }
        };
        self.downstream.broadcast(&self.node_id, error_msg);
      }
    }
  }
}
