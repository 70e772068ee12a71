//! Tests for the delay node.

use crate::error::ExecutionError;
use crate::executor::{Executor, Output};
use crate::message::{Map, Message};
use crate::node::{Node, NodeStatus};
use crate::nodes::delay_node::Delay;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_forwards_after_configured_delay() {
  let mut delay = Delay::default();
  let mut config = Map::new();
  config.insert("delayMs".to_string(), json!(250));
  delay.init(&config).await.unwrap();
  assert_eq!(delay.delay(), Duration::from_millis(250));

  let start = Instant::now();
  let out = delay
    .execute(&CancellationToken::new(), Message::new(json!("later")))
    .await
    .unwrap();
  assert!(start.elapsed() >= Duration::from_millis(250));
  assert!(matches!(out, Output::Single(ref m) if m.payload() == &json!("later")));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_wait() {
  let delay = Delay::default();
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(10)).await;
    trigger.cancel();
  });

  let start = Instant::now();
  let err = delay
    .execute(&cancel, Message::new(json!(1)))
    .await
    .unwrap_err();
  assert!(matches!(err, ExecutionError::Cancelled));
  assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_stopping_mid_delay_drops_the_message_quietly() {
  let node = Node::new("d", "delay", "Delay", "function", Box::new(Delay::default()), 4);
  let mut out = node.output_stream(4);
  node.start(&CancellationToken::new()).await.unwrap();
  node.send(Message::new(json!("held"))).unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;

  node.stop().await.unwrap();
  assert!(
    tokio::time::timeout(Duration::from_secs(5), out.next())
      .await
      .is_err()
  );
  assert_eq!(node.stats().failed, 0);
  assert_eq!(node.status(), NodeStatus::Idle);
}
