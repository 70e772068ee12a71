//! Tests for plugin load ordering.

use crate::error::{DependencyError, PluginError, RegistryError};
use crate::executor::PassThrough;
use crate::plugin::{DependencyResolver, Plugin, load_order, load_plugins};
use crate::registry::{NodeDescriptor, Registry};
use std::sync::Arc;

struct Feature {
  name: &'static str,
  deps: Vec<&'static str>,
  node_type: Option<&'static str>,
}

impl Feature {
  fn new(name: &'static str, deps: &[&'static str]) -> Arc<dyn Plugin> {
    Arc::new(Self {
      name,
      deps: deps.to_vec(),
      node_type: None,
    })
  }

  fn with_node(name: &'static str, deps: &[&'static str], node_type: &'static str) -> Arc<dyn Plugin> {
    Arc::new(Self {
      name,
      deps: deps.to_vec(),
      node_type: Some(node_type),
    })
  }
}

impl Plugin for Feature {
  fn name(&self) -> &str {
    self.name
  }

  fn dependencies(&self) -> Vec<String> {
    self.deps.iter().map(|d| d.to_string()).collect()
  }

  fn register_nodes(&self, registry: &Registry) -> Result<(), RegistryError> {
    match self.node_type {
      Some(t) => registry.register(NodeDescriptor::new(t, self.name).with_factory(|| Box::new(PassThrough))),
      None => Ok(()),
    }
  }
}

fn position(order: &[String], name: &str) -> usize {
  order.iter().position(|n| n == name).unwrap()
}

#[test]
fn test_chain_resolves_dependencies_first() {
  let plugins = vec![
    Feature::new("C", &[]),
    Feature::new("B", &["C"]),
    Feature::new("A", &["B"]),
  ];
  assert_eq!(load_order(&plugins).unwrap(), vec!["C", "B", "A"]);
}

#[test]
fn test_roots_visited_lexicographically_regardless_of_input_order() {
  let forward = vec![
    Feature::new("zeta", &[]),
    Feature::new("alpha", &[]),
    Feature::new("mid", &[]),
  ];
  let mut backward = forward.clone();
  backward.reverse();

  let expected = vec!["alpha", "mid", "zeta"];
  assert_eq!(load_order(&forward).unwrap(), expected);
  assert_eq!(load_order(&backward).unwrap(), expected);
}

#[test]
fn test_diamond_emits_shared_dependency_once() {
  let mut resolver = DependencyResolver::new();
  resolver.add("app", ["http", "mqtt"]);
  resolver.add("http", ["core"]);
  resolver.add("mqtt", ["core"]);
  resolver.add("core", Vec::<String>::new());

  let order = resolver.resolve().unwrap();
  assert_eq!(order.len(), 4);
  assert_eq!(order.iter().filter(|n| *n == "core").count(), 1);
  assert!(position(&order, "core") < position(&order, "http"));
  assert!(position(&order, "core") < position(&order, "mqtt"));
  assert!(position(&order, "http") < position(&order, "app"));
  assert!(position(&order, "mqtt") < position(&order, "app"));
  assert_eq!(resolver.resolve().unwrap(), order);
}

#[test]
fn test_cycle_is_reported_without_partial_order() {
  let mut resolver = DependencyResolver::new();
  resolver.add("A", ["B"]);
  resolver.add("B", ["A"]);

  let err = resolver.resolve().unwrap_err();
  assert!(matches!(err, DependencyError::Circular(_)));
}

#[test]
fn test_self_dependency_is_a_cycle() {
  let mut resolver = DependencyResolver::new();
  resolver.add("loop", ["loop"]);
  assert_eq!(
    resolver.topological_sort().unwrap_err(),
    DependencyError::Circular("loop".to_string())
  );
}

#[test]
fn test_missing_dependency_is_distinct_from_cycle() {
  let mut resolver = DependencyResolver::new();
  resolver.add("A", ["ghost"]);

  assert_eq!(
    resolver.resolve().unwrap_err(),
    DependencyError::Missing {
      plugin: "A".to_string(),
      dependency: "ghost".to_string(),
    }
  );
  let missing = resolver.missing_dependencies();
  assert_eq!(missing.get("A"), Some(&vec!["ghost".to_string()]));
}

#[test]
fn test_long_chain_does_not_recurse() {
  let mut resolver = DependencyResolver::new();
  let depth = 20_000;
  for i in 0..depth {
    let name = format!("p{:05}", i);
    if i + 1 < depth {
      resolver.add(name, [format!("p{:05}", i + 1)]);
    } else {
      resolver.add(name, Vec::<String>::new());
    }
  }
  let order = resolver.resolve().unwrap();
  assert_eq!(order.len(), depth);
  assert_eq!(order[0], format!("p{:05}", depth - 1));
  assert_eq!(order[depth - 1], "p00000");
}

#[test]
fn test_dependents_and_can_unload() {
  let mut resolver = DependencyResolver::new();
  resolver.add("core", Vec::<String>::new());
  resolver.add("http", ["core"]);
  resolver.add("mqtt", ["core"]);

  assert_eq!(resolver.dependents("core"), vec!["http", "mqtt"]);
  assert!(!resolver.can_unload("core"));
  assert!(resolver.can_unload("http"));
}

#[test]
fn test_duplicate_declaration_replaces_earlier() {
  let mut resolver = DependencyResolver::new();
  resolver.add("a", ["missing"]);
  resolver.add("a", Vec::<String>::new());

  assert_eq!(resolver.len(), 1);
  assert_eq!(resolver.resolve().unwrap(), vec!["a"]);
}

#[test]
fn test_load_plugins_registers_in_dependency_order() {
  let registry = Registry::new();
  let plugins = vec![
    Feature::with_node("gpio", &["core"], "gpio-in"),
    Feature::with_node("core", &[], "inject"),
  ];

  let order = load_plugins(&plugins, &registry).unwrap();
  assert_eq!(order, vec!["core", "gpio"]);
  assert!(registry.contains("inject"));
  assert!(registry.contains("gpio-in"));
}

#[test]
fn test_load_plugins_reports_registration_failure() {
  let registry = Registry::new();
  let plugins = vec![
    Feature::with_node("a", &[], "same"),
    Feature::with_node("b", &["a"], "same"),
  ];

  let err = load_plugins(&plugins, &registry).unwrap_err();
  assert!(matches!(
    err,
    PluginError::Registration { ref plugin, source: RegistryError::DuplicateType(_) } if plugin == "b"
  ));
}
