//! Tests for the flow graph owner.

use crate::config::RuntimeConfig;
use crate::error::{ConfigError, ExecutionError, FlowError, NodeError};
use crate::executor::{Executor, Output, PassThrough};
use crate::flow::Flow;
use crate::message::{Map, Message, Value};
use crate::node::NodeStatus;
use crate::registry::{NodeDescriptor, PropertyKind, PropertySchema, Registry};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Refuses to start.
struct Broken;

#[async_trait]
impl Executor for Broken {
  async fn init(&mut self, _config: &Map<String, Value>) -> Result<(), ConfigError> {
    Err(ConfigError::invalid("device", "not attached"))
  }

  async fn execute(
    &self,
    _cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    Ok(Output::Single(msg))
  }
}

fn registry() -> Arc<Registry> {
  let registry = Registry::with_config(RuntimeConfig::default().with_drain_capacity(4));
  registry
    .register(NodeDescriptor::new("pass", "core").with_factory(|| Box::new(PassThrough)))
    .unwrap();
  registry
    .register(NodeDescriptor::new("broken", "core").with_factory(|| Box::new(Broken)))
    .unwrap();
  registry
    .register(
      NodeDescriptor::new("scoped", "core")
        .with_property(PropertySchema::new("flowId", PropertyKind::String))
        .with_factory(|| Box::new(PassThrough)),
    )
    .unwrap();
  Arc::new(registry)
}

#[tokio::test]
async fn test_messages_traverse_connected_nodes() {
  let flow = Flow::new("f", registry());
  let a = flow.add_node("pass", "A", Map::new()).unwrap();
  let b = flow.add_node("pass", "B", Map::new()).unwrap();
  flow.connect(&a, &b).unwrap();
  let mut out = flow.observe(&b).unwrap();

  flow.start().await.unwrap();
  assert!(flow.is_running());
  flow.inject(&a, Message::new(json!("hello"))).unwrap();

  let got = tokio::time::timeout(Duration::from_millis(500), out.next())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(got.payload(), &json!("hello"));

  flow.stop().await.unwrap();
  assert!(!flow.is_running());
  assert_eq!(flow.node(&a).unwrap().status(), NodeStatus::Idle);
}

#[tokio::test]
async fn test_unknown_node_is_reported() {
  let flow = Flow::new("f", registry());
  let a = flow.add_node("pass", "A", Map::new()).unwrap();

  assert!(matches!(
    flow.connect(&a, "ghost"),
    Err(FlowError::UnknownNode(id)) if id == "ghost"
  ));
  assert!(matches!(
    flow.inject("ghost", Message::new(json!(1))),
    Err(FlowError::UnknownNode(_))
  ));
  assert!(matches!(
    flow.add_node("nope", "N", Map::new()),
    Err(FlowError::Registry(_))
  ));
}

#[tokio::test]
async fn test_failed_start_rolls_back_started_nodes() {
  let flow = Flow::new("f", registry());
  let a = flow.add_node("pass", "A", Map::new()).unwrap();
  let broken = flow.add_node("broken", "B", Map::new()).unwrap();

  let err = flow.start().await.unwrap_err();
  assert!(matches!(err, FlowError::Node(NodeError::Init { .. })));
  assert!(!flow.node(&a).unwrap().is_active());
  assert_eq!(flow.failed_nodes(), vec![broken]);
  assert!(!flow.is_running());
}

#[tokio::test]
async fn test_flow_restarts_after_stop() {
  let flow = Flow::new("f", registry());
  let a = flow.add_node("pass", "A", Map::new()).unwrap();
  let mut out = flow.observe(&a).unwrap();

  flow.start().await.unwrap();
  flow.stop().await.unwrap();
  assert!(flow.inject(&a, Message::new(json!(1))).is_err());

  flow.start().await.unwrap();
  flow.inject(&a, Message::new(json!(2))).unwrap();
  let got = tokio::time::timeout(Duration::from_millis(500), out.next())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(got.payload(), &json!(2));
  flow.stop().await.unwrap();
}

#[test]
fn test_flow_id_is_injected_when_declared() {
  let flow = Flow::new("kitchen", registry());
  let scoped = flow.add_node("scoped", "S", Map::new()).unwrap();
  let plain = flow.add_node("pass", "P", Map::new()).unwrap();

  let mut explicit = Map::new();
  explicit.insert("flowId".to_string(), json!("other"));
  let overridden = flow.add_node("scoped", "O", explicit).unwrap();

  assert_eq!(flow.node(&scoped).unwrap().config().get("flowId"), Some(&json!("kitchen")));
  assert!(flow.node(&plain).unwrap().config().get("flowId").is_none());
  assert_eq!(flow.node(&overridden).unwrap().config().get("flowId"), Some(&json!("other")));
  assert_eq!(flow.nodes().len(), 3);
}

#[test]
fn test_disconnect() {
  let flow = Flow::new("f", registry());
  let a = flow.add_node("pass", "A", Map::new()).unwrap();
  let b = flow.add_node("pass", "B", Map::new()).unwrap();
  flow.connect(&a, &b).unwrap();

  assert!(flow.disconnect(&a, &b).unwrap());
  assert!(!flow.disconnect(&a, &b).unwrap());
  assert!(flow.node(&a).unwrap().outputs().is_empty());
}
