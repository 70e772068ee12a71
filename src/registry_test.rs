//! Tests for the node type registry.

use crate::config::RuntimeConfig;
use crate::error::{ConfigError, RegistryError};
use crate::executor::PassThrough;
use crate::message::Map;
use crate::node::NodeStatus;
use crate::registry::{NodeDescriptor, PropertyKind, PropertySchema, Registry};
use serde_json::json;

fn pass(type_name: &str, category: &str) -> NodeDescriptor {
  NodeDescriptor::new(type_name, category).with_factory(|| Box::new(PassThrough))
}

#[test]
fn test_register_and_count() {
  let registry = Registry::new();
  registry.register(pass("a", "core")).unwrap();
  registry.register(pass("b", "core")).unwrap();

  assert_eq!(registry.count(), 2);
  assert!(registry.contains("a"));
  assert!(registry.get("b").is_some());
}

#[test]
fn test_duplicate_registration_leaves_count_unchanged() {
  let registry = Registry::new();
  registry.register(pass("a", "core")).unwrap();

  let err = registry.register(pass("a", "other")).unwrap_err();
  assert!(matches!(err, RegistryError::DuplicateType(name) if name == "a"));
  assert_eq!(registry.count(), 1);
  assert_eq!(registry.get("a").unwrap().category, "core");
}

#[test]
fn test_empty_type_name_rejected() {
  let registry = Registry::new();
  let err = registry.register(pass("  ", "core")).unwrap_err();
  assert!(matches!(err, RegistryError::EmptyType));
  assert_eq!(registry.count(), 0);
}

#[test]
fn test_missing_factory_rejected() {
  let registry = Registry::new();
  let err = registry
    .register(NodeDescriptor::new("bare", "core"))
    .unwrap_err();
  assert!(matches!(err, RegistryError::MissingFactory(name) if name == "bare"));
  assert_eq!(registry.count(), 0);
}

#[test]
fn test_create_unknown_type_is_not_found() {
  let registry = Registry::new();
  let err = registry.create_node("ghost", "Ghost").unwrap_err();
  assert!(matches!(err, RegistryError::NotFound(name) if name == "ghost"));
}

#[test]
fn test_create_node_inherits_descriptor_metadata() {
  let registry = Registry::with_config(RuntimeConfig::default().with_queue_capacity(2));
  registry.register(pass("pass", "function")).unwrap();

  let a = registry.create_node("pass", "First").unwrap();
  let b = registry.create_node("pass", "Second").unwrap();

  assert_eq!(a.type_name(), "pass");
  assert_eq!(a.category(), "function");
  assert_eq!(a.display_name(), "First");
  assert_eq!(a.status(), NodeStatus::Idle);
  assert_ne!(a.id(), b.id());

  // capacity comes from the runtime config
  assert!(a.send(json!(1).into()).is_ok());
  assert!(a.send(json!(2).into()).is_ok());
  assert!(a.send(json!(3).into()).is_err());
}

#[test]
fn test_list_is_sorted_and_filterable() {
  let registry = Registry::new();
  registry.register(pass("zeta", "sequence")).unwrap();
  registry.register(pass("alpha", "network")).unwrap();
  registry.register(pass("mid", "sequence")).unwrap();

  let names: Vec<_> = registry.list().iter().map(|d| d.type_name.clone()).collect();
  assert_eq!(names, vec!["alpha", "mid", "zeta"]);

  let seq: Vec<_> = registry
    .list_by_category("sequence")
    .iter()
    .map(|d| d.type_name.clone())
    .collect();
  assert_eq!(seq, vec!["mid", "zeta"]);
  assert_eq!(registry.categories(), vec!["network", "sequence"]);
}

#[test]
fn test_unregister() {
  let registry = Registry::new();
  registry.register(pass("a", "core")).unwrap();

  assert!(registry.unregister("a").is_ok());
  assert_eq!(registry.count(), 0);
  assert!(matches!(
    registry.unregister("a"),
    Err(RegistryError::NotFound(_))
  ));
}

#[test]
fn test_schema_defaults_and_required_properties() {
  let registry = Registry::new();
  registry
    .register(
      pass("limiter", "function")
        .with_property(PropertySchema::new("rate", PropertyKind::Number).required())
        .with_property(
          PropertySchema::new("strategy", PropertyKind::String).with_default(json!("drop")),
        ),
    )
    .unwrap();

  let err = registry.create_node("limiter", "L").unwrap_err();
  assert!(matches!(
    err,
    RegistryError::Config { source: ConfigError::Missing(ref p), .. } if p == "rate"
  ));

  let mut config = Map::new();
  config.insert("rate".to_string(), json!(5));
  let node = registry.create_node_with_config("limiter", "L", config).unwrap();
  assert_eq!(node.config().get("strategy"), Some(&json!("drop")));
  assert_eq!(node.config().get("rate"), Some(&json!(5)));
}

#[test]
fn test_descriptor_serialises_without_factory() {
  let descriptor = pass("pass", "core")
    .with_description("forwards messages")
    .with_property(PropertySchema::new("name", PropertyKind::String));

  let value = serde_json::to_value(&descriptor).unwrap();
  assert_eq!(value["typeName"], json!("pass"));
  assert_eq!(value["category"], json!("core"));
  assert_eq!(value["properties"][0]["kind"], json!("string"));
  assert_eq!(value["inputs"][0]["name"], json!("input"));
  assert!(value.get("factory").is_none());
}
