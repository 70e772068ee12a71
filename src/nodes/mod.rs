//! # Built-in Node Library
//!
//! Processing units that sit directly on the runtime services:
//!
//! | type         | category   | service                                   |
//! |--------------|------------|-------------------------------------------|
//! | `split`      | `sequence` | emits sequences                           |
//! | `join`       | `sequence` | [`SequenceCorrelator`], [`MergeCollector`]|
//! | `rate-limit` | `function` | [`RateLimiter`]                           |
//! | `delay`      | `function` | cooperative timer                         |
//! | `link-in`    | `common`   | [`LinkRegistry`]                          |
//! | `link-out`   | `common`   | [`LinkRegistry`]                          |
//!
//! [`register_builtin`] adds all of them to a [`Registry`].
//!
//! [`SequenceCorrelator`]: crate::correlator::SequenceCorrelator
//! [`MergeCollector`]: crate::correlator::MergeCollector
//! [`RateLimiter`]: crate::rate_limit::RateLimiter

pub mod delay_node;
pub mod join_node;
pub mod link_node;
pub mod rate_limit_node;
pub mod split_node;

#[cfg(test)]
mod delay_node_test;
#[cfg(test)]
mod rate_limit_node_test;
#[cfg(test)]
mod split_node_test;

use crate::error::RegistryError;
use crate::link::LinkRegistry;
use crate::registry::{NodeDescriptor, PortSchema, PropertyKind, PropertySchema, Registry};
use serde_json::json;
use std::sync::Arc;

pub use delay_node::Delay;
pub use join_node::Join;
pub use link_node::{LinkIn, LinkOut};
pub use rate_limit_node::RateLimit;
pub use split_node::{DEFAULT_SEPARATOR, Split};

/// Type name of [`Split`].
pub const SPLIT: &str = "split";
/// Type name of [`Join`].
pub const JOIN: &str = "join";
/// Type name of [`RateLimit`].
pub const RATE_LIMIT: &str = "rate-limit";
/// Type name of [`Delay`].
pub const DELAY: &str = "delay";
/// Type name of [`LinkIn`].
pub const LINK_IN: &str = "link-in";
/// Type name of [`LinkOut`].
pub const LINK_OUT: &str = "link-out";

fn link_scope_properties(descriptor: NodeDescriptor) -> NodeDescriptor {
  descriptor
    .with_property(
      PropertySchema::new("scope", PropertyKind::String)
        .with_default(json!("global"))
        .with_description("global or flow"),
    )
    .with_property(PropertySchema::new("flowId", PropertyKind::String))
}

/// Registers every built-in node type. Link nodes share `links`.
pub fn register_builtin(registry: &Registry, links: Arc<LinkRegistry>) -> Result<(), RegistryError> {
  registry.register(
    NodeDescriptor::new(SPLIT, "sequence")
      .with_description("Splits an array, object or string into a sequence of messages")
      .with_property(
        PropertySchema::new("separator", PropertyKind::String).with_default(json!(DEFAULT_SEPARATOR)),
      )
      .with_factory(|| Box::new(Split::default())),
  )?;

  registry.register(
    NodeDescriptor::new(JOIN, "sequence")
      .with_description("Reassembles a sequence, or merges a fixed number of messages")
      .with_property(PropertySchema::new("mode", PropertyKind::String).with_default(json!("auto")))
      .with_property(
        PropertySchema::new("separator", PropertyKind::String).with_default(json!(DEFAULT_SEPARATOR)),
      )
      .with_property(PropertySchema::new("timeoutMs", PropertyKind::Number))
      .with_property(PropertySchema::new("maxPending", PropertyKind::Number))
      .with_property(PropertySchema::new("count", PropertyKind::Number))
      .with_factory(|| Box::new(Join::default())),
  )?;

  registry.register(
    NodeDescriptor::new(RATE_LIMIT, "function")
      .with_description("Limits throughput with a token bucket")
      .with_property(PropertySchema::new("rate", PropertyKind::Number).with_default(json!(10)))
      .with_property(PropertySchema::new("windowMs", PropertyKind::Number).with_default(json!(1000)))
      .with_property(
        PropertySchema::new("strategy", PropertyKind::String)
          .with_default(json!("drop"))
          .with_description("drop, queue or delay"),
      )
      .with_property(PropertySchema::new("maxQueue", PropertyKind::Number))
      .with_factory(|| Box::new(RateLimit::default())),
  )?;

  registry.register(
    NodeDescriptor::new(DELAY, "function")
      .with_description("Delays each message")
      .with_property(PropertySchema::new("delayMs", PropertyKind::Number).with_default(json!(1000)))
      .with_factory(|| Box::new(Delay::default())),
  )?;

  let link_in = Arc::clone(&links);
  registry.register(
    link_scope_properties(
      NodeDescriptor::new(LINK_IN, "common")
        .with_description("Receives messages sent to a link id")
        .with_property(PropertySchema::new("linkId", PropertyKind::String).required()),
    )
    .with_factory(move || Box::new(LinkIn::new(Arc::clone(&link_in)))),
  )?;

  registry.register(
    link_scope_properties(
      NodeDescriptor::new(LINK_OUT, "common")
        .with_description("Sends messages to link ids")
        .with_property(PropertySchema::new("links", PropertyKind::Array).required())
        .with_outputs(Vec::<PortSchema>::new()),
    )
    .with_factory(move || Box::new(LinkOut::new(Arc::clone(&links)))),
  )?;

  Ok(())
}
