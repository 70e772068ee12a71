//! Tests for the rate limit node.

use crate::executor::Executor;
use crate::message::{Map, Message, MessageKind, Value};
use crate::node::Node;
use crate::nodes::rate_limit_node::RateLimit;
use crate::rate_limit::OverflowStrategy;
use serde_json::json;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

fn config(entries: Value) -> Map<String, Value> {
  match entries {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}

fn limiter_node(settings: Value) -> Node {
  let node = Node::new("limit", "rate-limit", "Limit", "function", Box::new(RateLimit::default()), 32);
  node.replace_config(config(settings));
  node
}

#[tokio::test]
async fn test_init_reads_strategy() {
  let mut node = RateLimit::default();
  node
    .init(&config(json!({"rate": 3, "windowMs": 500, "strategy": "queue", "maxQueue": 7})))
    .await
    .unwrap();

  let limiter = node.limiter();
  assert_eq!(limiter.rate(), 3);
  assert_eq!(limiter.window(), Duration::from_millis(500));
  assert_eq!(limiter.strategy(), OverflowStrategy::Queue { max_size: 7 });
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
  let mut node = RateLimit::default();
  assert!(node.init(&config(json!({"rate": 0}))).await.is_err());
  assert!(node.init(&config(json!({"windowMs": 0}))).await.is_err());
  assert!(node.init(&config(json!({"strategy": "burst"}))).await.is_err());
  assert!(
    node
      .init(&config(json!({"strategy": "queue", "maxQueue": 0})))
      .await
      .is_err()
  );
}

#[tokio::test(start_paused = true)]
async fn test_drop_strategy_emits_error_messages_for_excess() {
  let node = limiter_node(json!({"rate": 2, "windowMs": 60000}));
  let mut out = node.output_stream(16);
  node.start(&CancellationToken::new()).await.unwrap();

  for i in 0..3 {
    node.send(Message::new(json!(i))).unwrap();
  }
  let mut data = 0;
  let mut errors = Vec::new();
  for _ in 0..3 {
    let msg = out.next().await.unwrap();
    match msg.kind() {
      MessageKind::Error => errors.push(msg),
      _ => data += 1,
    }
  }
  assert_eq!(data, 2);
  assert_eq!(errors.len(), 1);
  assert_eq!(
    errors[0].error_info().unwrap().code.as_deref(),
    Some("rate_limit_exceeded")
  );
  // the rejected message keeps its payload and the limiter's annotation
  assert_eq!(errors[0].payload(), &json!(2));
  assert_eq!(
    errors[0].metadata().get("rateLimit"),
    Some(&json!({"reason": "rate_limit_exceeded", "rate": 2, "windowMs": 60000}))
  );
  node.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_queue_strategy_drains_through_node_output() {
  let node = limiter_node(json!({"rate": 1, "windowMs": 100, "strategy": "queue"}));
  let mut out = node.output_stream(16);
  node.start(&CancellationToken::new()).await.unwrap();

  for i in 0..3 {
    node.send(Message::new(json!(i))).unwrap();
  }
  let mut seen = Vec::new();
  for _ in 0..3 {
    seen.push(out.next().await.unwrap().payload().clone());
  }
  assert_eq!(seen, vec![json!(0), json!(1), json!(2)]);

  node.stop().await.unwrap();
}
