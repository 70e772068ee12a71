//! # Node Type Registry
//!
//! Catalog mapping a node type name to a [`NodeDescriptor`]: static metadata
//! plus a factory producing fresh [`Executor`] instances. Registration is an
//! append-only startup/plugin-load operation; lookups dominate at run time, so
//! the catalog sits behind a read-write lock.
//!
//! One registry is constructed at process start and shared by reference
//! (`Arc<Registry>`); tests build isolated instances.
//!
//! ## Example
//!
//! ```rust
//! use edgeflow::executor::PassThrough;
//! use edgeflow::registry::{NodeDescriptor, Registry};
//!
//! let registry = Registry::new();
//! registry
//!   .register(NodeDescriptor::new("pass", "core").with_factory(|| Box::new(PassThrough)))
//!   .unwrap();
//!
//! let node = registry.create_node("pass", "My pass-through").unwrap();
//! assert_eq!(node.category(), "core");
//! ```

use crate::config::RuntimeConfig;
use crate::error::{ConfigError, RegistryError};
use crate::executor::Executor;
use crate::message::{Map, Value};
use crate::node::Node;
use crate::sync;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Produces a fresh processing unit for every created node.
pub type ExecutorFactory = Arc<dyn Fn() -> Box<dyn Executor> + Send + Sync>;

/// Value type of a configurable property, for editors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
  /// Text.
  String,
  /// Integer or float.
  Number,
  /// Flag.
  Boolean,
  /// Ordered list.
  Array,
  /// Map.
  Object,
  /// Anything.
  Any,
}

/// Schema of one configurable property.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
  /// Property name as it appears in the node config.
  pub name: String,
  /// Value type.
  pub kind: PropertyKind,
  /// Whether creation fails when the property is absent and has no default.
  pub required: bool,
  /// Value applied when the property is absent.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
  /// Help text.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl PropertySchema {
  /// An optional property with no default.
  pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
    Self {
      name: name.into(),
      kind,
      required: false,
      default: None,
      description: None,
    }
  }

  /// Marks the property as required.
  #[must_use]
  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  /// Sets the default value.
  #[must_use]
  pub fn with_default(mut self, value: Value) -> Self {
    self.default = Some(value);
    self
  }

  /// Sets the help text.
  #[must_use]
  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

/// Schema of one input or output port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortSchema {
  /// Port name.
  pub name: String,
  /// Help text.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl PortSchema {
  /// A port without help text.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: None,
    }
  }
}

/// Static description of a node type. Never mutated after registration.
///
/// Serialises to JSON for external editors; the factory is skipped.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
  /// Unique type name.
  pub type_name: String,
  /// Palette category, inherited by created nodes.
  pub category: String,
  /// Help text.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Configurable properties.
  pub properties: Vec<PropertySchema>,
  /// Input ports.
  pub inputs: Vec<PortSchema>,
  /// Output ports.
  pub outputs: Vec<PortSchema>,
  #[serde(skip)]
  factory: Option<ExecutorFactory>,
}

impl NodeDescriptor {
  /// A descriptor with one `input` and one `output` port and no factory yet.
  pub fn new(type_name: impl Into<String>, category: impl Into<String>) -> Self {
    Self {
      type_name: type_name.into(),
      category: category.into(),
      description: None,
      properties: Vec::new(),
      inputs: vec![PortSchema::new("input")],
      outputs: vec![PortSchema::new("output")],
      factory: None,
    }
  }

  /// Sets the factory.
  #[must_use]
  pub fn with_factory<F>(mut self, factory: F) -> Self
  where
    F: Fn() -> Box<dyn Executor> + Send + Sync + 'static,
  {
    self.factory = Some(Arc::new(factory));
    self
  }

  /// Sets the help text.
  #[must_use]
  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Adds a configurable property.
  #[must_use]
  pub fn with_property(mut self, property: PropertySchema) -> Self {
    self.properties.push(property);
    self
  }

  /// Replaces the input ports.
  #[must_use]
  pub fn with_inputs(mut self, inputs: Vec<PortSchema>) -> Self {
    self.inputs = inputs;
    self
  }

  /// Replaces the output ports.
  #[must_use]
  pub fn with_outputs(mut self, outputs: Vec<PortSchema>) -> Self {
    self.outputs = outputs;
    self
  }

  /// Whether a factory is present.
  pub fn has_factory(&self) -> bool {
    self.factory.is_some()
  }

  /// Applies property defaults to `config` and checks required properties.
  pub fn resolve_config(&self, mut config: Map<String, Value>) -> Result<Map<String, Value>, ConfigError> {
    for property in &self.properties {
      if config.contains_key(&property.name) {
        continue;
      }
      match (&property.default, property.required) {
        (Some(default), _) => {
          config.insert(property.name.clone(), default.clone());
        }
        (None, true) => return Err(ConfigError::Missing(property.name.clone())),
        (None, false) => {}
      }
    }
    Ok(config)
  }
}

impl fmt::Debug for NodeDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeDescriptor")
      .field("type_name", &self.type_name)
      .field("category", &self.category)
      .field("properties", &self.properties)
      .field("has_factory", &self.factory.is_some())
      .finish()
  }
}

/// Thread-safe catalog of node types.
#[derive(Debug, Default)]
pub struct Registry {
  descriptors: RwLock<HashMap<String, Arc<NodeDescriptor>>>,
  config: RuntimeConfig,
}

impl Registry {
  /// An empty registry with default runtime settings.
  pub fn new() -> Self {
    Self::default()
  }

  /// An empty registry creating nodes with `config`'s queue capacity.
  pub fn with_config(config: RuntimeConfig) -> Self {
    Self {
      descriptors: RwLock::new(HashMap::new()),
      config,
    }
  }

  /// Runtime settings used for created nodes.
  pub fn runtime_config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Adds a node type.
  ///
  /// Rejects an empty type name, a missing factory, or a type already present;
  /// a rejected registration leaves the catalog unchanged.
  pub fn register(&self, descriptor: NodeDescriptor) -> Result<(), RegistryError> {
    trace!(node_type = %descriptor.type_name, "Registry::register()");
    if descriptor.type_name.trim().is_empty() {
      return Err(RegistryError::EmptyType);
    }
    if descriptor.factory.is_none() {
      return Err(RegistryError::MissingFactory(descriptor.type_name));
    }

    let mut descriptors = sync::write(&self.descriptors);
    if descriptors.contains_key(&descriptor.type_name) {
      return Err(RegistryError::DuplicateType(descriptor.type_name));
    }
    debug!(node_type = %descriptor.type_name, category = %descriptor.category, "registered node type");
    descriptors.insert(descriptor.type_name.clone(), Arc::new(descriptor));
    Ok(())
  }

  /// Removes a node type; nodes already created are unaffected.
  pub fn unregister(&self, type_name: &str) -> Result<Arc<NodeDescriptor>, RegistryError> {
    sync::write(&self.descriptors)
      .remove(type_name)
      .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))
  }

  /// Looks up a descriptor.
  pub fn get(&self, type_name: &str) -> Option<Arc<NodeDescriptor>> {
    sync::read(&self.descriptors).get(type_name).cloned()
  }

  /// Whether a type is registered.
  pub fn contains(&self, type_name: &str) -> bool {
    sync::read(&self.descriptors).contains_key(type_name)
  }

  /// All descriptors, ordered by type name.
  pub fn list(&self) -> Vec<Arc<NodeDescriptor>> {
    let mut all: Vec<_> = sync::read(&self.descriptors).values().cloned().collect();
    all.sort_by(|a, b| a.type_name.cmp(&b.type_name));
    all
  }

  /// Descriptors of one category, ordered by type name.
  pub fn list_by_category(&self, category: &str) -> Vec<Arc<NodeDescriptor>> {
    self
      .list()
      .into_iter()
      .filter(|d| d.category == category)
      .collect()
  }

  /// Distinct categories, sorted.
  pub fn categories(&self) -> Vec<String> {
    sync::read(&self.descriptors)
      .values()
      .map(|d| d.category.clone())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  /// Number of registered types.
  pub fn count(&self) -> usize {
    sync::read(&self.descriptors).len()
  }

  /// Instantiates a node of `type_name` with an empty configuration.
  pub fn create_node(&self, type_name: &str, display_name: &str) -> Result<Node, RegistryError> {
    self.create_node_with_config(type_name, display_name, Map::new())
  }

  /// Instantiates a node of `type_name`, seeding its configuration.
  ///
  /// Schema defaults fill absent properties; an absent required property
  /// without default fails with [`RegistryError::Config`].
  pub fn create_node_with_config(
    &self,
    type_name: &str,
    display_name: &str,
    config: Map<String, Value>,
  ) -> Result<Node, RegistryError> {
    trace!(node_type = %type_name, "Registry::create_node()");
    let descriptor = self
      .get(type_name)
      .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))?;
    let factory = descriptor
      .factory
      .as_ref()
      .ok_or_else(|| RegistryError::MissingFactory(type_name.to_string()))?;

    let config = descriptor
      .resolve_config(config)
      .map_err(|source| RegistryError::Config {
        type_name: type_name.to_string(),
        source,
      })?;

    let node = Node::new(
      new_node_id(),
      descriptor.type_name.clone(),
      display_name,
      descriptor.category.clone(),
      factory(),
      self.config.queue_capacity,
    );
    node.replace_config(config);
    Ok(node)
  }
}

/// A random 64-bit hex node id.
pub fn new_node_id() -> String {
  format!("{:016x}", rand::random::<u64>())
}
