//! # Rate Limit Node
//!
//! Forwards at most `rate` messages per `windowMs`; see
//! [`RateLimiter`](crate::rate_limit::RateLimiter) for the overflow strategies.
//! Rejections surface downstream as error messages whose code is the
//! admission reason (`rate_limit_exceeded`, `queue_full`). With the `queue`
//! strategy a drain task runs for as long as the node does and emits parked
//! messages at the refill rate.
//!
//! ## Configuration
//!
//! | property   | default  | meaning                      |
//! |------------|----------|------------------------------|
//! | `rate`     | 10       | messages per window          |
//! | `windowMs` | 1000     | window length                |
//! | `strategy` | `"drop"` | `drop`, `queue` or `delay`   |
//! | `maxQueue` | 1000     | FIFO bound for `queue`       |

use crate::config::parse_node_config;
use crate::error::{ConfigError, ExecutionError};
use crate::executor::{Executor, NodeContext, Output};
use crate::message::{Map, Message, Value};
use crate::rate_limit::{DEFAULT_MAX_QUEUE, OverflowStrategy, RateLimiter};
use crate::sync;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RateLimitConfig {
  rate: u32,
  window_ms: u64,
  strategy: String,
  max_queue: usize,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      rate: 10,
      window_ms: 1000,
      strategy: "drop".to_string(),
      max_queue: DEFAULT_MAX_QUEUE,
    }
  }
}

impl RateLimitConfig {
  fn overflow(&self) -> Result<OverflowStrategy, ConfigError> {
    match self.strategy.as_str() {
      "drop" => Ok(OverflowStrategy::Drop),
      "queue" if self.max_queue == 0 => Err(ConfigError::invalid("maxQueue", "must be at least 1")),
      "queue" => Ok(OverflowStrategy::Queue {
        max_size: self.max_queue,
      }),
      "delay" => Ok(OverflowStrategy::Delay),
      other => Err(ConfigError::invalid(
        "strategy",
        format!("unknown strategy '{}', expected drop, queue or delay", other),
      )),
    }
  }
}

/// Token-bucket throttle.
#[derive(Debug)]
pub struct RateLimit {
  limiter: Arc<RateLimiter>,
  drain: Mutex<Option<JoinHandle<()>>>,
}

impl Default for RateLimit {
  fn default() -> Self {
    let config = RateLimitConfig::default();
    Self {
      limiter: Arc::new(RateLimiter::new(
        config.rate,
        Duration::from_millis(config.window_ms),
        OverflowStrategy::Drop,
      )),
      drain: Mutex::new(None),
    }
  }
}

impl RateLimit {
  /// The limiter currently in use.
  pub fn limiter(&self) -> &Arc<RateLimiter> {
    &self.limiter
  }
}

#[async_trait]
impl Executor for RateLimit {
  async fn init(&mut self, config: &Map<String, Value>) -> Result<(), ConfigError> {
    let config: RateLimitConfig = parse_node_config(config)?;
    if config.rate == 0 {
      return Err(ConfigError::invalid("rate", "must be at least 1"));
    }
    if config.window_ms == 0 {
      return Err(ConfigError::invalid("windowMs", "must be at least 1"));
    }
    let strategy = config.overflow()?;
    self.limiter = Arc::new(RateLimiter::new(
      config.rate,
      Duration::from_millis(config.window_ms),
      strategy,
    ));
    Ok(())
  }

  fn attach(&self, ctx: NodeContext) {
    if !matches!(self.limiter.strategy(), OverflowStrategy::Queue { .. }) {
      return;
    }
    let cancel = ctx.cancellation().clone();
    let handle = self.limiter.spawn_drain(cancel, move |msg| {
      ctx.emit(msg);
    });
    *sync::lock(&self.drain) = Some(handle);
  }

  async fn execute(
    &self,
    cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Output, ExecutionError> {
    let admitted = self.limiter.admit(cancel, msg).await?;
    Ok(admitted.into())
  }

  async fn cleanup(&self) -> Result<(), ExecutionError> {
    let handle = sync::lock(&self.drain).take();
    if let Some(handle) = handle {
      // the drain ends with the node's cancellation
      handle
        .await
        .map_err(|e| ExecutionError::failed(format!("rate limit drain failed: {}", e)))?;
    }
    Ok(())
  }
}
