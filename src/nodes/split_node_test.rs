//! Tests for the split node.

use crate::executor::{Executor, Output};
use crate::message::{Map, Message, SequenceKind};
use crate::nodes::split_node::Split;
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn split(split: &Split, msg: Message) -> Vec<Message> {
  split
    .execute(&CancellationToken::new(), msg)
    .await
    .unwrap()
    .into_messages()
}

#[tokio::test]
async fn test_array_becomes_indexed_sequence() {
  let input = Message::new(json!(["a", "b", "c"])).with_topic("letters");
  let id = input.id().clone();
  let parts = split(&Split::default(), input).await;

  assert_eq!(parts.len(), 3);
  let sequence = parts[0].parts().unwrap().sequence_id.clone();
  for (i, part) in parts.iter().enumerate() {
    let info = part.parts().unwrap();
    assert_eq!(info.index, i);
    assert_eq!(info.count, 3);
    assert_eq!(info.kind, SequenceKind::Array);
    assert_eq!(info.sequence_id, sequence);
    assert_eq!(part.topic(), Some("letters"));
    assert_eq!(part.id(), &id);
  }
  assert_eq!(parts[1].payload(), &json!("b"));
}

#[tokio::test]
async fn test_object_members_carry_keys() {
  let parts = split(&Split::default(), Message::new(json!({"x": 1, "y": 2}))).await;

  assert_eq!(parts.len(), 2);
  assert_eq!(parts[0].parts().unwrap().key.as_deref(), Some("x"));
  assert_eq!(parts[1].parts().unwrap().key.as_deref(), Some("y"));
  assert_eq!(parts[1].payload(), &json!(2));
  assert_eq!(parts[0].parts().unwrap().kind, SequenceKind::Object);
}

#[tokio::test]
async fn test_string_uses_configured_separator() {
  let mut node = Split::default();
  let mut config = Map::new();
  config.insert("separator".to_string(), json!(","));
  node.init(&config).await.unwrap();

  let parts = split(&node, Message::new(json!("a,b"))).await;
  assert_eq!(parts.len(), 2);
  assert_eq!(parts[0].payload(), &json!("a"));
  assert_eq!(parts[1].parts().unwrap().kind, SequenceKind::String);
}

#[tokio::test]
async fn test_each_input_gets_its_own_sequence() {
  let node = Split::with_separator(" ");
  let first = split(&node, Message::new(json!([1]))).await;
  let second = split(&node, Message::new(json!([1]))).await;
  assert_ne!(
    first[0].parts().unwrap().sequence_id,
    second[0].parts().unwrap().sequence_id
  );
}

#[tokio::test]
async fn test_scalar_passes_through_and_empty_array_emits_nothing() {
  let out = Split::default()
    .execute(&CancellationToken::new(), Message::new(json!(42)))
    .await
    .unwrap();
  assert!(matches!(out, Output::Single(ref m) if m.payload() == &json!(42)));

  let out = Split::default()
    .execute(&CancellationToken::new(), Message::new(json!([])))
    .await
    .unwrap();
  assert!(out.is_nothing());
}

#[tokio::test]
async fn test_empty_separator_is_rejected() {
  let mut node = Split::default();
  let mut config = Map::new();
  config.insert("separator".to_string(), json!(""));
  assert!(node.init(&config).await.is_err());
}
