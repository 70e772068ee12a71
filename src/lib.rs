//! # EdgeFlow
//!
//! Flow-based automation runtime for edge devices.
//!
//! Processing units ("nodes") are wired into a directed graph; at run time
//! messages flow along its edges and every node transforms, filters or
//! branches them. This crate is the execution and routing engine:
//!
//! - [`node`]: one actor per node, with a bounded inbound queue, a delivery
//!   task and non-blocking fan-out
//! - [`registry`]: catalog of node types and their factories
//! - [`correlator`]: reassembly of split sequences (join/merge)
//! - [`rate_limit`]: token-bucket admission control
//! - [`link`]: named virtual wires between unconnected graph regions
//! - [`plugin`]: deterministic plugin load ordering with cycle detection
//! - [`flow`]: a graph of nodes sharing one lifecycle
//! - [`nodes`]: built-in units using those services
//!
//! Delivery is best-effort: a full queue drops the message instead of
//! blocking the sender, and failures inside the graph travel as error
//! messages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgeflow::flow::Flow;
//! use edgeflow::link::LinkRegistry;
//! use edgeflow::message::{Map, Message};
//! use edgeflow::nodes;
//! use edgeflow::registry::Registry;
//! use serde_json::json;
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! edgeflow::logging::init();
//! let registry = Arc::new(Registry::new());
//! nodes::register_builtin(&registry, Arc::new(LinkRegistry::new()))?;
//!
//! let flow = Flow::new("sensors", Arc::clone(&registry));
//! let split = flow.add_node(nodes::SPLIT, "Split readings", Map::new())?;
//! let join = flow.add_node(nodes::JOIN, "Join readings", Map::new())?;
//! flow.connect(&split, &join)?;
//! let mut out = flow.observe(&join)?;
//!
//! flow.start().await?;
//! flow.inject(&split, Message::new(json!([21.5, 22.0, 22.4])))?;
//! let joined = out.next().await;
//! flow.stop().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Runtime and node configuration.
pub mod config;
/// Sequence reassembly.
pub mod correlator;
/// Error types.
pub mod error;
/// The processing unit contract.
pub mod executor;
/// Graph owner.
pub mod flow;
/// Virtual wiring.
pub mod link;
/// Subscriber setup.
pub mod logging;
/// Message model.
pub mod message;
/// Node runtime.
pub mod node;
/// Built-in node types.
pub mod nodes;
/// Plugin load ordering.
pub mod plugin;
/// Token-bucket admission control.
pub mod rate_limit;
/// Node type catalog.
pub mod registry;

mod sync;

#[cfg(test)]
mod flow_test;
#[cfg(test)]
mod link_test;
#[cfg(test)]
mod plugin_test;
#[cfg(test)]
mod registry_test;

pub use error::{
  AdmissionError, ConfigError, CorrelationError, DependencyError, ExecutionError, FlowError,
  LinkError, NodeError, PluginError, RegistryError, SendError,
};
pub use executor::{Executor, NodeContext, Output};
pub use flow::Flow;
pub use message::{Message, MessageId, MessageKind, SequenceInfo, SequenceKind, StructuredError};
pub use node::{Node, NodeHandle, NodeStats, NodeStatus};
pub use registry::{NodeDescriptor, Registry};
