//! # Flow
//!
//! A [`Flow`] owns one graph of nodes: it creates them through the shared
//! [`Registry`], wires edges, and starts or stops them together under one
//! cancellation scope.
//!
//! ```rust,no_run
//! use edgeflow::flow::Flow;
//! use edgeflow::link::LinkRegistry;
//! use edgeflow::message::{Map, Message};
//! use edgeflow::nodes;
//! use edgeflow::registry::Registry;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(Registry::new());
//! nodes::register_builtin(&registry, Arc::new(LinkRegistry::new()))?;
//!
//! let flow = Flow::new("main", Arc::clone(&registry));
//! let split = flow.add_node("split", "Split", Map::new())?;
//! let join = flow.add_node("join", "Join", Map::new())?;
//! flow.connect(&split, &join)?;
//! let mut out = flow.observe(&join)?;
//!
//! flow.start().await?;
//! flow.inject(&split, Message::new(json!([1, 2, 3])))?;
//! flow.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::FlowError;
use crate::message::{Map, Message, Value};
use crate::node::{Node, NodeStatus};
use crate::registry::Registry;
use crate::sync;
use std::sync::{Arc, Mutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Config property a node type declares to receive its owning flow id.
const FLOW_ID_PROPERTY: &str = "flowId";

/// A graph of nodes sharing one lifecycle.
pub struct Flow {
  id: String,
  registry: Arc<Registry>,
  nodes: RwLock<Vec<Arc<Node>>>,
  cancel: Mutex<CancellationToken>,
}

impl Flow {
  /// An empty flow creating its nodes from `registry`.
  pub fn new(id: impl Into<String>, registry: Arc<Registry>) -> Self {
    Self {
      id: id.into(),
      registry,
      nodes: RwLock::new(Vec::new()),
      cancel: Mutex::new(CancellationToken::new()),
    }
  }

  /// Flow id.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Creates a node of `type_name` and adds it to the flow. Returns its id.
  ///
  /// Node types declaring a `flowId` property receive this flow's id unless
  /// `config` already sets one.
  pub fn add_node(
    &self,
    type_name: &str,
    display_name: &str,
    mut config: Map<String, Value>,
  ) -> Result<String, FlowError> {
    trace!(flow = %self.id, node_type = %type_name, "Flow::add_node()");
    let wants_flow_id = self
      .registry
      .get(type_name)
      .is_some_and(|d| d.properties.iter().any(|p| p.name == FLOW_ID_PROPERTY));
    if wants_flow_id && !config.contains_key(FLOW_ID_PROPERTY) {
      config.insert(FLOW_ID_PROPERTY.to_string(), Value::String(self.id.clone()));
    }

    let node = self
      .registry
      .create_node_with_config(type_name, display_name, config)?;
    let id = node.id().to_string();
    sync::write(&self.nodes).push(Arc::new(node));
    Ok(id)
  }

  /// Looks up a node.
  pub fn node(&self, node_id: &str) -> Option<Arc<Node>> {
    sync::read(&self.nodes)
      .iter()
      .find(|n| n.id() == node_id)
      .cloned()
  }

  /// All nodes, in insertion order.
  pub fn nodes(&self) -> Vec<Arc<Node>> {
    sync::read(&self.nodes).clone()
  }

  fn require(&self, node_id: &str) -> Result<Arc<Node>, FlowError> {
    self
      .node(node_id)
      .ok_or_else(|| FlowError::UnknownNode(node_id.to_string()))
  }

  /// Adds an edge `from -> to`.
  pub fn connect(&self, from: &str, to: &str) -> Result<(), FlowError> {
    let source = self.require(from)?;
    let target = self.require(to)?;
    source.connect(&target);
    Ok(())
  }

  /// Removes the edge `from -> to`. Returns whether it existed.
  pub fn disconnect(&self, from: &str, to: &str) -> Result<bool, FlowError> {
    let source = self.require(from)?;
    let target = self.require(to)?;
    Ok(source.disconnect(&target))
  }

  /// Opens an observation queue on a node's output, bounded by the registry's
  /// drain capacity.
  pub fn observe(&self, node_id: &str) -> Result<ReceiverStream<Message>, FlowError> {
    let node = self.require(node_id)?;
    Ok(node.output_stream(self.registry.runtime_config().drain_capacity))
  }

  /// Sends `msg` into a node without blocking.
  pub fn inject(&self, node_id: &str, msg: Message) -> Result<(), FlowError> {
    self.require(node_id)?.send(msg)?;
    Ok(())
  }

  /// Starts every node under a fresh flow scope.
  ///
  /// When a node fails to start, the nodes already started are stopped again
  /// and the error is returned.
  pub async fn start(&self) -> Result<(), FlowError> {
    let token = CancellationToken::new();
    *sync::lock(&self.cancel) = token.clone();

    let nodes = self.nodes();
    for (started, node) in nodes.iter().enumerate() {
      if let Err(err) = node.start(&token).await {
        warn!(flow = %self.id, node = %node.id(), error = %err, "flow start failed, rolling back");
        for previous in nodes[..started].iter().rev() {
          if let Err(stop_err) = previous.stop().await {
            warn!(flow = %self.id, node = %previous.id(), error = %stop_err, "rollback stop failed");
          }
        }
        token.cancel();
        return Err(err.into());
      }
    }
    info!(flow = %self.id, nodes = nodes.len(), "flow started");
    Ok(())
  }

  /// Cancels the flow scope and stops every node, last added first.
  ///
  /// All nodes are stopped even when one fails; the first failure is returned.
  pub async fn stop(&self) -> Result<(), FlowError> {
    sync::lock(&self.cancel).cancel();
    let mut first_error = None;
    for node in self.nodes().iter().rev() {
      if let Err(err) = node.stop().await {
        warn!(flow = %self.id, node = %node.id(), error = %err, "node failed to stop");
        first_error.get_or_insert(err);
      }
    }
    info!(flow = %self.id, "flow stopped");
    match first_error {
      Some(err) => Err(err.into()),
      None => Ok(()),
    }
  }

  /// Whether any node is running.
  pub fn is_running(&self) -> bool {
    sync::read(&self.nodes).iter().any(|n| n.is_active())
  }

  /// Ids of nodes currently in [`NodeStatus::Error`].
  pub fn failed_nodes(&self) -> Vec<String> {
    sync::read(&self.nodes)
      .iter()
      .filter(|n| n.status() == NodeStatus::Error)
      .map(|n| n.id().to_string())
      .collect()
  }
}

impl std::fmt::Debug for Flow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Flow")
      .field("id", &self.id)
      .field("nodes", &sync::read(&self.nodes).len())
      .finish()
  }
}
