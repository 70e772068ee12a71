//! # Plugin Dependency Resolver
//!
//! Computes a load order for optional feature modules from their declared
//! dependencies (by name). Runs once at startup, independent of message flow.
//!
//! The sort is a depth-first traversal with three marks per plugin
//! (unvisited, on the current path, done), driven by an explicit stack so
//! deep dependency chains cannot exhaust the call stack. Roots are visited in
//! lexicographic order, so one input set always yields one order. Every plugin
//! is emitted after all of its transitive dependencies.
//!
//! A missing dependency and a cycle are reported as different
//! [`DependencyError`] variants: the first is fixed by installing a plugin,
//! the second needs reconfiguration.
//!
//! ## Example
//!
//! ```rust
//! use edgeflow::plugin::DependencyResolver;
//!
//! let mut resolver = DependencyResolver::new();
//! resolver.add("a", ["b"]);
//! resolver.add("b", ["c"]);
//! resolver.add("c", [] as [&str; 0]);
//! assert_eq!(resolver.resolve().unwrap(), vec!["c", "b", "a"]);
//! ```

use crate::error::{DependencyError, PluginError, RegistryError};
use crate::registry::Registry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An optional feature module.
pub trait Plugin: Send + Sync {
  /// Stable unique name.
  fn name(&self) -> &str;

  /// Names of the plugins that must load first.
  fn dependencies(&self) -> Vec<String> {
    Vec::new()
  }

  /// Contributes node types. Called once, in load order.
  fn register_nodes(&self, _registry: &Registry) -> Result<(), RegistryError> {
    Ok(())
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  OnPath,
  Done,
}

/// Dependency graph over plugin names.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
  plugins: BTreeMap<String, Vec<String>>,
}

impl DependencyResolver {
  /// An empty graph.
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds the graph from plugin declarations.
  pub fn from_plugins<'a, I>(plugins: I) -> Self
  where
    I: IntoIterator<Item = &'a dyn Plugin>,
  {
    let mut resolver = Self::new();
    for plugin in plugins {
      resolver.add(plugin.name(), plugin.dependencies());
    }
    resolver
  }

  /// Declares a plugin. A later declaration of the same name replaces the earlier one.
  pub fn add<I, S>(&mut self, name: impl Into<String>, dependencies: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let name = name.into();
    let dependencies = dependencies.into_iter().map(Into::into).collect();
    if self.plugins.insert(name.clone(), dependencies).is_some() {
      warn!(plugin = %name, "duplicate plugin declaration replaced");
    }
  }

  /// Number of declared plugins.
  pub fn len(&self) -> usize {
    self.plugins.len()
  }

  /// Whether no plugin is declared.
  pub fn is_empty(&self) -> bool {
    self.plugins.is_empty()
  }

  /// Fails on the first dependency absent from the set, in name order.
  pub fn validate_dependencies(&self) -> Result<(), DependencyError> {
    for (plugin, dependencies) in &self.plugins {
      if let Some(dependency) = dependencies.iter().find(|d| !self.plugins.contains_key(*d)) {
        return Err(DependencyError::Missing {
          plugin: plugin.clone(),
          dependency: dependency.clone(),
        });
      }
    }
    Ok(())
  }

  /// Unmet dependencies per plugin; plugins with none are omitted.
  pub fn missing_dependencies(&self) -> BTreeMap<String, Vec<String>> {
    self
      .plugins
      .iter()
      .filter_map(|(plugin, dependencies)| {
        let missing: Vec<String> = dependencies
          .iter()
          .filter(|d| !self.plugins.contains_key(*d))
          .cloned()
          .collect();
        (!missing.is_empty()).then(|| (plugin.clone(), missing))
      })
      .collect()
  }

  /// Plugins that directly depend on `name`, sorted.
  pub fn dependents(&self, name: &str) -> Vec<String> {
    self
      .plugins
      .iter()
      .filter(|(_, dependencies)| dependencies.iter().any(|d| d == name))
      .map(|(plugin, _)| plugin.clone())
      .collect()
  }

  /// A plugin can be unloaded when nothing depends on it.
  pub fn can_unload(&self, name: &str) -> bool {
    self.dependents(name).is_empty()
  }

  /// Orders plugins so that each follows all of its dependencies.
  ///
  /// Aborts on the first cycle with the name that closed it; no partial
  /// order is returned.
  pub fn topological_sort(&self) -> Result<Vec<String>, DependencyError> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.plugins.len());
    let mut order = Vec::with_capacity(self.plugins.len());

    for root in self.plugins.keys() {
      if marks.contains_key(root.as_str()) {
        continue;
      }
      marks.insert(root.as_str(), Mark::OnPath);
      // (plugin, index of the next dependency to visit)
      let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];

      while let Some(&(name, next)) = stack.last() {
        let dependencies = self.plugins.get(name).map(Vec::as_slice).unwrap_or_default();
        let Some(dependency) = dependencies.get(next) else {
          marks.insert(name, Mark::Done);
          order.push(name.to_string());
          stack.pop();
          continue;
        };
        if let Some(top) = stack.last_mut() {
          top.1 += 1;
        }

        match marks.get(dependency.as_str()) {
          Some(Mark::Done) => {}
          Some(Mark::OnPath) => return Err(DependencyError::Circular(dependency.clone())),
          None => {
            let Some((key, _)) = self.plugins.get_key_value(dependency) else {
              return Err(DependencyError::Missing {
                plugin: name.to_string(),
                dependency: dependency.clone(),
              });
            };
            marks.insert(key.as_str(), Mark::OnPath);
            stack.push((key.as_str(), 0));
          }
        }
      }
    }
    Ok(order)
  }

  /// Validates, then sorts.
  pub fn resolve(&self) -> Result<Vec<String>, DependencyError> {
    self.validate_dependencies()?;
    let order = self.topological_sort()?;
    debug!(order = ?order, "resolved plugin load order");
    Ok(order)
  }
}

/// Load order of `plugins`.
pub fn load_order(plugins: &[Arc<dyn Plugin>]) -> Result<Vec<String>, DependencyError> {
  DependencyResolver::from_plugins(plugins.iter().map(|p| p.as_ref() as &dyn Plugin)).resolve()
}

/// Resolves the load order, then lets each plugin register its node types in
/// that order. Returns the order.
pub fn load_plugins(plugins: &[Arc<dyn Plugin>], registry: &Registry) -> Result<Vec<String>, PluginError> {
  let order = load_order(plugins)?;
  // later declarations win, as in the resolver
  let by_name: HashMap<&str, &Arc<dyn Plugin>> = plugins.iter().map(|p| (p.name(), p)).collect();
  for name in &order {
    if let Some(plugin) = by_name.get(name.as_str()) {
      plugin
        .register_nodes(registry)
        .map_err(|source| PluginError::Registration {
          plugin: name.clone(),
          source,
        })?;
      info!(plugin = %name, "plugin loaded");
    }
  }
  Ok(order)
}
