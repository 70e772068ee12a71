//! Tests for the virtual wiring directory.

use crate::error::{LinkError, SendError};
use crate::executor::PassThrough;
use crate::link::{LinkInHandle, LinkRegistry, LinkScope};
use crate::message::Message;
use crate::node::Node;
use serde_json::json;

fn node(id: &str, capacity: usize) -> Node {
  Node::new(id, "link-in", id, "network", Box::new(PassThrough), capacity)
}

fn ids(list: &[&str]) -> Vec<String> {
  list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_register_and_unregister_removes_empty_entry() {
  let links = LinkRegistry::new();
  let a = node("a", 4);
  let b = node("b", 4);
  links.register_link_in(LinkInHandle::new("L", LinkScope::Global, None, a.handle()));
  links.register_link_in(LinkInHandle::new("L", LinkScope::Global, None, b.handle()));
  assert_eq!(links.count("L"), 2);

  assert_eq!(links.unregister_link_in("L", "a"), 1);
  assert_eq!(links.count("L"), 1);
  assert_eq!(links.unregister_link_in("L", "b"), 1);
  assert!(links.link_ids().is_empty());
  assert_eq!(links.unregister_link_in("L", "b"), 0);
}

#[test]
fn test_unregister_node_clears_every_link() {
  let links = LinkRegistry::new();
  let a = node("a", 4);
  links.register_link_in(LinkInHandle::new("one", LinkScope::Global, None, a.handle()));
  links.register_link_in(LinkInHandle::new("two", LinkScope::Global, None, a.handle()));

  assert_eq!(links.unregister_node("a"), 2);
  assert!(links.link_ids().is_empty());
}

#[test]
fn test_resolve_matches_ids_exactly() {
  let links = LinkRegistry::new();
  let a = node("a", 4);
  links.register_link_in(LinkInHandle::new("Alpha", LinkScope::Global, None, a.handle()));

  assert_eq!(links.resolve(&ids(&["Alpha"]), LinkScope::Global, None).len(), 1);
  assert!(links.resolve(&ids(&["alpha"]), LinkScope::Global, None).is_empty());
  assert!(links.resolve(&ids(&["Alp*"]), LinkScope::Global, None).is_empty());
}

#[test]
fn test_flow_scope_requires_equal_flow_id() {
  let links = LinkRegistry::new();
  let scoped = node("scoped", 4);
  let global = node("global", 4);
  links.register_link_in(LinkInHandle::new(
    "L",
    LinkScope::Flow,
    Some("f1".to_string()),
    scoped.handle(),
  ));
  links.register_link_in(LinkInHandle::new("L", LinkScope::Global, None, global.handle()));

  let names = |found: Vec<LinkInHandle>| {
    let mut n: Vec<String> = found.iter().map(|h| h.node_id().to_string()).collect();
    n.sort();
    n
  };
  assert_eq!(
    names(links.resolve(&ids(&["L"]), LinkScope::Flow, Some("f1"))),
    vec!["global", "scoped"]
  );
  assert_eq!(
    names(links.resolve(&ids(&["L"]), LinkScope::Flow, Some("f2"))),
    vec!["global"]
  );
  assert_eq!(
    names(links.resolve(&ids(&["L"]), LinkScope::Global, Some("f1"))),
    vec!["global"]
  );
}

#[test]
fn test_deliver_reaches_every_target() {
  let links = LinkRegistry::new();
  let a = node("a", 4);
  let b = node("b", 4);
  links.register_link_in(LinkInHandle::new("x", LinkScope::Global, None, a.handle()));
  links.register_link_in(LinkInHandle::new("y", LinkScope::Global, None, b.handle()));

  let delivered = links
    .deliver(&ids(&["x", "y"]), LinkScope::Global, None, &Message::new(json!(1)))
    .unwrap();
  assert_eq!(delivered, 2);
}

#[test]
fn test_deliver_reports_partial_failure_without_blocking_others() {
  let links = LinkRegistry::new();
  let full = node("full", 1);
  let open = node("open", 4);
  full.send(Message::new(json!("occupying"))).unwrap();
  links.register_link_in(LinkInHandle::new("L", LinkScope::Global, None, full.handle()));
  links.register_link_in(LinkInHandle::new("L", LinkScope::Global, None, open.handle()));

  let err = links
    .deliver(&ids(&["L"]), LinkScope::Global, None, &Message::new(json!(1)))
    .unwrap_err();
  assert_eq!(err, LinkError::DeliveryFailed { failed: 1, attempted: 2 });

  // the open target still received its copy
  for _ in 0..3 {
    open.send(Message::new(json!("fill"))).unwrap();
  }
  assert_eq!(open.send(Message::new(json!("over"))), Err(SendError::BufferFull));
}

#[test]
fn test_deliver_with_no_targets_is_ok() {
  let links = LinkRegistry::new();
  let delivered = links
    .deliver(&ids(&["nobody"]), LinkScope::Global, None, &Message::new(json!(1)))
    .unwrap();
  assert_eq!(delivered, 0);
}
