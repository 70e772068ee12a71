//! # Link Nodes
//!
//! Virtual wires between parts of a graph that share no edge.
//!
//! - [`LinkIn`] registers its node's inbound queue under `linkId` when the node
//!   starts, forwards whatever arrives, and unregisters when the node stops.
//! - [`LinkOut`] delivers every message to the Link-In nodes registered under
//!   its `links` and forwards nothing itself. When some deliveries fail the
//!   others still happen, and an error message reports the counts.
//!
//! Both take `scope` (`global` or `flow`) and `flowId`.

use crate::config::parse_node_config;
use crate::error::{ConfigError, ExecutionError};
use crate::executor::{Executor, NodeContext, Output};
use crate::link::{LinkInHandle, LinkRegistry, LinkScope};
use crate::message::{Map, Message, Value};
use crate::sync;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LinkInConfig {
  link_id: String,
  scope: LinkScope,
  flow_id: Option<String>,
}

/// Receiving end of a virtual wire.
#[derive(Debug)]
pub struct LinkIn {
  links: Arc<LinkRegistry>,
  config: LinkInConfig,
  registered: Mutex<Option<String>>,
}

impl LinkIn {
  /// A Link-In registering with `links`.
  pub fn new(links: Arc<LinkRegistry>) -> Self {
    Self {
      links,
      config: LinkInConfig::default(),
      registered: Mutex::new(None),
    }
  }
}

#[async_trait]
impl Executor for LinkIn {
  async fn init(&mut self, config: &Map<String, Value>) -> Result<(), ConfigError> {
    let config: LinkInConfig = parse_node_config(config)?;
    if config.link_id.is_empty() {
      return Err(ConfigError::Missing("linkId".to_string()));
    }
    self.config = config;
    Ok(())
  }

  fn attach(&self, ctx: NodeContext) {
    let handle = LinkInHandle::new(
      self.config.link_id.clone(),
      self.config.scope,
      self.config.flow_id.clone(),
      ctx.inbox().clone(),
    );
    self.links.register_link_in(handle);
    *sync::lock(&self.registered) = Some(ctx.node_id().to_string());
  }

  async fn execute(
    &self,
    _cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    Ok(Output::Single(msg))
  }

  async fn cleanup(&self) -> Result<(), ExecutionError> {
    let registered = sync::lock(&self.registered).take();
    if let Some(node_id) = registered {
      self.links.unregister_link_in(&self.config.link_id, &node_id);
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LinkOutConfig {
  links: Vec<String>,
  scope: LinkScope,
  flow_id: Option<String>,
}

/// Sending end of a virtual wire.
#[derive(Debug)]
pub struct LinkOut {
  links: Arc<LinkRegistry>,
  config: LinkOutConfig,
}

impl LinkOut {
  /// A Link-Out resolving against `links`.
  pub fn new(links: Arc<LinkRegistry>) -> Self {
    Self {
      links,
      config: LinkOutConfig::default(),
    }
  }
}

#[async_trait]
impl Executor for LinkOut {
  async fn init(&mut self, config: &Map<String, Value>) -> Result<(), ConfigError> {
    let config: LinkOutConfig = parse_node_config(config)?;
    if config.links.is_empty() {
      return Err(ConfigError::Missing("links".to_string()));
    }
    self.config = config;
    Ok(())
  }

  async fn execute(
    &self,
    _cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    let delivered = self.links.deliver(
      &self.config.links,
      self.config.scope,
      self.config.flow_id.as_deref(),
      &msg,
    )?;
    trace!(links = ?self.config.links, delivered, "link-out delivered");
    Ok(Output::Nothing)
  }
}
