//! # Link Registry
//!
//! Directory of named virtual wires. A Link-In node registers a
//! [`LinkInHandle`] under its link id when it starts and removes it when it
//! stops; a Link-Out node resolves link ids to handles and delivers to each
//! one with the same non-blocking semantics as a direct edge.
//!
//! ## Scope matching
//!
//! - A handle registered [`LinkScope::Global`] matches every request.
//! - A handle registered [`LinkScope::Flow`] matches only a `Flow` request
//!   carrying the same flow id.
//!
//! Link ids are compared case-sensitively, without wildcards.
//!
//! One registry is constructed at startup and shared as `Arc<LinkRegistry>`.

use crate::error::LinkError;
use crate::message::Message;
use crate::node::NodeHandle;
use crate::sync;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, trace};

/// Visibility of a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScope {
  /// Visible process-wide.
  #[default]
  Global,
  /// Visible within one flow.
  Flow,
}

/// Registration of one Link-In node under one link id.
#[derive(Clone, Debug)]
pub struct LinkInHandle {
  /// Link id the node listens on.
  pub link_id: String,
  /// Registration scope.
  pub scope: LinkScope,
  /// Owning flow, for `Flow` scope.
  pub flow_id: Option<String>,
  /// Inbound queue of the Link-In node.
  pub target: NodeHandle,
}

impl LinkInHandle {
  /// A handle for `target` listening on `link_id`.
  pub fn new(link_id: impl Into<String>, scope: LinkScope, flow_id: Option<String>, target: NodeHandle) -> Self {
    Self {
      link_id: link_id.into(),
      scope,
      flow_id,
      target,
    }
  }

  /// Id of the Link-In node.
  pub fn node_id(&self) -> &str {
    self.target.node_id()
  }

  /// Whether this handle is visible to a request in `scope` from `flow_id`.
  pub fn matches(&self, scope: LinkScope, flow_id: Option<&str>) -> bool {
    match self.scope {
      LinkScope::Global => true,
      LinkScope::Flow => scope == LinkScope::Flow && flow_id.is_some() && self.flow_id.as_deref() == flow_id,
    }
  }
}

/// Process-wide `link id -> handles` directory.
#[derive(Debug, Default)]
pub struct LinkRegistry {
  links: RwLock<HashMap<String, Vec<LinkInHandle>>>,
}

impl LinkRegistry {
  /// An empty directory.
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a handle under its link id.
  pub fn register_link_in(&self, handle: LinkInHandle) {
    debug!(link = %handle.link_id, node = %handle.node_id(), scope = ?handle.scope, "registered link-in");
    sync::write(&self.links)
      .entry(handle.link_id.clone())
      .or_default()
      .push(handle);
  }

  /// Removes the handles `node_id` registered under `link_id`; drops the entry
  /// once empty. Returns how many were removed.
  pub fn unregister_link_in(&self, link_id: &str, node_id: &str) -> usize {
    let mut links = sync::write(&self.links);
    let Some(handles) = links.get_mut(link_id) else {
      return 0;
    };
    let before = handles.len();
    handles.retain(|h| h.node_id() != node_id);
    let removed = before - handles.len();
    if handles.is_empty() {
      links.remove(link_id);
    }
    removed
  }

  /// Removes every handle `node_id` registered. Returns how many were removed.
  pub fn unregister_node(&self, node_id: &str) -> usize {
    let mut links = sync::write(&self.links);
    let mut removed = 0;
    links.retain(|_, handles| {
      let before = handles.len();
      handles.retain(|h| h.node_id() != node_id);
      removed += before - handles.len();
      !handles.is_empty()
    });
    removed
  }

  /// Handles registered under any of `link_ids` and visible to the request.
  pub fn resolve(&self, link_ids: &[String], scope: LinkScope, flow_id: Option<&str>) -> Vec<LinkInHandle> {
    let links = sync::read(&self.links);
    link_ids
      .iter()
      .filter_map(|id| links.get(id))
      .flatten()
      .filter(|h| h.matches(scope, flow_id))
      .cloned()
      .collect()
  }

  /// Number of handles registered under `link_id`.
  pub fn count(&self, link_id: &str) -> usize {
    sync::read(&self.links).get(link_id).map_or(0, Vec::len)
  }

  /// Registered link ids, sorted.
  pub fn link_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = sync::read(&self.links).keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Sends a copy of `msg` to every resolved handle without blocking.
  ///
  /// One handle's failure does not affect the others. Returns the number of
  /// successful deliveries, or [`LinkError::DeliveryFailed`] with counts when
  /// any delivery failed.
  pub fn deliver(
    &self,
    link_ids: &[String],
    scope: LinkScope,
    flow_id: Option<&str>,
    msg: &Message,
  ) -> Result<usize, LinkError> {
    let handles = self.resolve(link_ids, scope, flow_id);
    trace!(links = ?link_ids, targets = handles.len(), "LinkRegistry::deliver()");
    let attempted = handles.len();
    let failed = handles
      .iter()
      .filter(|h| h.target.try_deliver(msg.clone()).is_err())
      .count();
    if failed > 0 {
      return Err(LinkError::DeliveryFailed { failed, attempted });
    }
    Ok(attempted)
  }
}
