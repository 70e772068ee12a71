//! # Error Types
//!
//! One error enum per failure family. Inside a running flow, execution failures
//! are turned into error [`Message`](crate::message::Message)s and broadcast
//! downstream; at the API boundary (send, register, admit, resolve) every
//! failure is returned as one of these values.
//!
//! | family        | type                | raised by                                   |
//! |---------------|---------------------|---------------------------------------------|
//! | configuration | [`ConfigError`]     | `Executor::init`, registry defaults         |
//! | execution     | [`ExecutionError`]  | `Executor::execute`                         |
//! | lifecycle     | [`NodeError`]       | `Node::start` / `Node::stop`                |
//! | delivery      | [`SendError`]       | `Node::send`, downstream fan-out            |
//! | catalog       | [`RegistryError`]   | `Registry`                                  |
//! | admission     | [`AdmissionError`]  | `RateLimiter`                               |
//! | correlation   | [`CorrelationError`]| `SequenceCorrelator`, `MergeCollector`      |
//! | virtual wires | [`LinkError`]       | `LinkRegistry::deliver`                     |
//! | graph load    | [`DependencyError`] | `DependencyResolver`                        |
//! | plugin load   | [`PluginError`]     | `plugin::load_plugins`                      |
//! | flow          | [`FlowError`]       | `Flow`                                      |

use crate::message::Message;
use thiserror::Error;

/// Invalid or missing configuration. Raised at creation/start time, never ignored.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// A required property has no value.
  #[error("missing required property '{0}'")]
  Missing(String),

  /// A property has an unusable value.
  #[error("invalid value for '{field}': {reason}")]
  Invalid {
    /// Property name.
    field: String,
    /// Why the value was rejected.
    reason: String,
  },

  /// The configuration map could not be deserialised into the typed form.
  #[error("malformed configuration: {0}")]
  Malformed(#[from] serde_json::Error),
}

impl ConfigError {
  /// Shorthand for [`ConfigError::Invalid`].
  pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
    ConfigError::Invalid {
      field: field.into(),
      reason: reason.into(),
    }
  }
}

/// Failure inside `Executor::execute`.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// Generic failure with a description.
  #[error("{0}")]
  Failed(String),

  /// The node's cancellation fired while the unit was waiting.
  #[error("execution cancelled")]
  Cancelled,

  /// The unit's configuration turned out to be unusable at run time.
  #[error(transparent)]
  Config(#[from] ConfigError),

  /// Rate-limit admission was refused.
  #[error(transparent)]
  Admission(#[from] AdmissionError),

  /// Sequence reassembly failed.
  #[error(transparent)]
  Correlation(#[from] CorrelationError),

  /// Virtual-wire delivery failed.
  #[error(transparent)]
  Link(#[from] LinkError),
}

impl ExecutionError {
  /// Shorthand for [`ExecutionError::Failed`].
  pub fn failed(reason: impl Into<String>) -> Self {
    ExecutionError::Failed(reason.into())
  }

  /// Machine readable code attached to the synthesized error message.
  pub fn code(&self) -> &'static str {
    match self {
      ExecutionError::Failed(_) => "execution_failed",
      ExecutionError::Cancelled => "cancelled",
      ExecutionError::Config(_) => "config_error",
      ExecutionError::Admission(err) => err.reason(),
      ExecutionError::Correlation(_) => "correlation_error",
      ExecutionError::Link(_) => "link_delivery_failed",
    }
  }

  /// Whether the failure is the unit giving up on a cancelled wait.
  pub fn is_cancelled(&self) -> bool {
    matches!(
      self,
      ExecutionError::Cancelled | ExecutionError::Admission(AdmissionError::Cancelled)
    )
  }

  /// The message the failure rejected, when the error carries one.
  pub fn into_rejected(self) -> Option<Message> {
    match self {
      ExecutionError::Admission(err) => err.into_message(),
      _ => None,
    }
  }
}

/// Node lifecycle failure.
#[derive(Debug, Error)]
pub enum NodeError {
  /// `start` was called on a node whose delivery task is already active.
  #[error("node '{0}' is already running")]
  AlreadyRunning(String),

  /// The processing unit rejected its configuration.
  #[error("node '{node}' failed to initialise: {source}")]
  Init {
    /// Node id.
    node: String,
    /// Underlying configuration error.
    #[source]
    source: ConfigError,
  },

  /// The processing unit's teardown failed.
  #[error("node '{node}' cleanup failed: {source}")]
  Cleanup {
    /// Node id.
    node: String,
    /// Underlying error.
    #[source]
    source: ExecutionError,
  },

  /// The delivery task panicked or was aborted.
  #[error("node '{node}' delivery task failed: {reason}")]
  Task {
    /// Node id.
    node: String,
    /// Join error description.
    reason: String,
  },
}

/// Non-blocking delivery failure. Never retried by the runtime.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SendError {
  /// The target node's cancellation has fired.
  #[error("node is stopped")]
  Stopped,

  /// The target node's inbound queue is at capacity.
  #[error("inbound buffer is full")]
  BufferFull,
}

/// Node type catalog failure.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// A descriptor with this type name is already registered.
  #[error("node type '{0}' is already registered")]
  DuplicateType(String),

  /// The descriptor has an empty type name.
  #[error("node type name must not be empty")]
  EmptyType,

  /// The descriptor has no factory.
  #[error("node type '{0}' has no factory")]
  MissingFactory(String),

  /// No descriptor with this type name exists.
  #[error("node type '{0}' not found")]
  NotFound(String),

  /// The node configuration does not satisfy the descriptor schema.
  #[error("invalid configuration for node type '{type_name}': {source}")]
  Config {
    /// Type name.
    type_name: String,
    /// Underlying configuration error.
    #[source]
    source: ConfigError,
  },
}

/// Rate-limit admission refusal. The rejected message travels with the error.
#[derive(Debug, Error)]
pub enum AdmissionError {
  /// No token available and the strategy is `drop`.
  #[error("rate limit exceeded")]
  RateLimitExceeded {
    /// The rejected message, annotated with the reason.
    message: Box<Message>,
  },

  /// No token available and the overflow queue is full.
  #[error("rate limit queue is full")]
  QueueFull {
    /// The rejected message, annotated with the reason.
    message: Box<Message>,
  },

  /// Cancellation fired during a `delay` wait.
  #[error("rate limit wait cancelled")]
  Cancelled,
}

impl AdmissionError {
  /// Machine readable reason so callers can decide whether to retry.
  pub fn reason(&self) -> &'static str {
    match self {
      AdmissionError::RateLimitExceeded { .. } => "rate_limit_exceeded",
      AdmissionError::QueueFull { .. } => "queue_full",
      AdmissionError::Cancelled => "cancelled",
    }
  }

  /// Returns the rejected message, if any.
  pub fn into_message(self) -> Option<Message> {
    match self {
      AdmissionError::RateLimitExceeded { message } | AdmissionError::QueueFull { message } => {
        Some(*message)
      }
      AdmissionError::Cancelled => None,
    }
  }
}

/// Sequence reassembly failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
  /// The message carries no sequence information.
  #[error("message has no sequence information")]
  MissingParts,

  /// `count` is zero.
  #[error("sequence '{0}' has a zero count")]
  EmptySequence(String),

  /// `index` is not below `count`.
  #[error("index {index} out of range for sequence '{sequence_id}' of {count}")]
  IndexOutOfRange {
    /// Sequence id.
    sequence_id: String,
    /// Offending index.
    index: usize,
    /// Declared count.
    count: usize,
  },

  /// A member declares a different count than the open buffer.
  #[error("sequence '{sequence_id}' expects {expected} members, message declares {found}")]
  CountMismatch {
    /// Sequence id.
    sequence_id: String,
    /// Count of the open buffer.
    expected: usize,
    /// Count declared by the message.
    found: usize,
  },

  /// A second member arrived for an index already filled.
  #[error("duplicate index {index} for sequence '{sequence_id}'")]
  DuplicateIndex {
    /// Sequence id.
    sequence_id: String,
    /// Duplicated index.
    index: usize,
  },

  /// An `object` member has no key.
  #[error("object member {index} of sequence '{sequence_id}' has no key")]
  MissingKey {
    /// Sequence id.
    sequence_id: String,
    /// Index of the member.
    index: usize,
  },

  /// A member payload cannot be reassembled into the sequence kind.
  #[error("cannot assemble sequence '{sequence_id}': {reason}")]
  Unassemblable {
    /// Sequence id.
    sequence_id: String,
    /// Why assembly failed.
    reason: String,
  },

  /// A merge input is neither an object nor topic-keyed.
  #[error("merge input must be an object or carry a topic")]
  NotMergeable,
}

/// Virtual-wire delivery failure. Does not identify which targets failed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LinkError {
  /// At least one resolved Link-In did not accept the message.
  #[error("{failed} of {attempted} link deliveries failed")]
  DeliveryFailed {
    /// Number of failed deliveries.
    failed: usize,
    /// Number of resolved targets.
    attempted: usize,
  },
}

/// Plugin graph load failure. The two variants need different remedies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
  /// A plugin depends on a name absent from the set; install it.
  #[error("plugin '{plugin}' has missing dependency '{dependency}'")]
  Missing {
    /// The dependent plugin.
    plugin: String,
    /// The absent dependency.
    dependency: String,
  },

  /// The dependency graph has a cycle; reconfigure.
  #[error("circular dependency detected at plugin '{0}'")]
  Circular(String),
}

/// Plugin installation failure.
#[derive(Debug, Error)]
pub enum PluginError {
  /// The load order could not be computed.
  #[error(transparent)]
  Dependency(#[from] DependencyError),

  /// A plugin failed to register its node types.
  #[error("plugin '{plugin}' failed to register: {source}")]
  Registration {
    /// The failing plugin.
    plugin: String,
    /// Underlying registry error.
    #[source]
    source: RegistryError,
  },
}

/// Graph owner failure.
#[derive(Debug, Error)]
pub enum FlowError {
  /// No node with this id belongs to the flow.
  #[error("node '{0}' is not part of this flow")]
  UnknownNode(String),

  /// Node creation failed.
  #[error(transparent)]
  Registry(#[from] RegistryError),

  /// Node lifecycle failed.
  #[error(transparent)]
  Node(#[from] NodeError),

  /// Injection failed.
  #[error(transparent)]
  Send(#[from] SendError),
}
