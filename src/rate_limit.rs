//! # Rate Limiter
//!
//! Token-bucket admission control. The bucket holds at most `rate` tokens and
//! refills continuously at `rate` tokens per `window`; every admitted message
//! consumes one token. When the bucket is empty the [`OverflowStrategy`]
//! decides what happens:
//!
//! - [`Drop`](OverflowStrategy::Drop) rejects with `rate_limit_exceeded`.
//! - [`Queue`](OverflowStrategy::Queue) parks the message in a bounded FIFO,
//!   rejecting with `queue_full` when it is at capacity. While anything is
//!   parked, new arrivals join the back of the FIFO even if a token is free.
//!   A drain task started with [`RateLimiter::spawn_drain`] forwards the
//!   oldest parked message every `window / rate`, spending a token for each,
//!   so the bucket stays the only cap on throughput.
//! - [`Delay`](OverflowStrategy::Delay) waits until one token has accumulated
//!   (or cancellation fires), then retries once.
//!
//! Rejected messages travel inside the [`AdmissionError`], annotated with
//! `metadata["rateLimit"]`. The node runtime forwards them as error messages
//! that keep the payload and the annotation.
//!
//! Time is read from `tokio::time`, so paused-clock tests drive refills.

use crate::error::AdmissionError;
use crate::message::Message;
use crate::sync;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default bound of the queue strategy's FIFO.
pub const DEFAULT_MAX_QUEUE: usize = 1000;

/// What to do with a message when no token is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowStrategy {
  /// Reject immediately.
  #[default]
  Drop,
  /// Park in a bounded FIFO drained at the refill rate.
  Queue {
    /// FIFO bound.
    max_size: usize,
  },
  /// Wait for one token, then retry once.
  Delay,
}

/// Continuously refilled token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
  capacity: f64,
  tokens: f64,
  last_refill: Instant,
  window: Duration,
}

impl TokenBucket {
  /// A full bucket of `rate` tokens refilled over `window`.
  pub fn new(rate: u32, window: Duration) -> Self {
    let capacity = f64::from(rate.max(1));
    Self {
      capacity,
      tokens: capacity,
      last_refill: Instant::now(),
      window: window.max(Duration::from_millis(1)),
    }
  }

  fn refill(&mut self) {
    let now = Instant::now();
    let elapsed = now.duration_since(self.last_refill).as_secs_f64();
    let added = self.capacity * elapsed / self.window.as_secs_f64();
    self.tokens = (self.tokens + added).min(self.capacity);
    self.last_refill = now;
  }

  /// Consumes one token if available.
  pub fn try_consume(&mut self) -> bool {
    self.refill();
    if self.tokens >= 1.0 {
      self.tokens -= 1.0;
      true
    } else {
      false
    }
  }

  /// Tokens available now.
  pub fn available(&mut self) -> f64 {
    self.refill();
    self.tokens
  }

  /// Time until one whole token will have accumulated, rounded up to the
  /// millisecond.
  pub fn time_to_next_token(&mut self) -> Duration {
    self.refill();
    let deficit = (1.0 - self.tokens).max(0.0);
    let millis = (self.window.as_secs_f64() * deficit / self.capacity * 1000.0).ceil();
    Duration::from_millis(millis as u64)
  }
}

#[derive(Debug)]
struct LimiterState {
  bucket: TokenBucket,
  queue: VecDeque<Message>,
}

/// Admission controller shared by every caller of one rate-limit node.
#[derive(Debug)]
pub struct RateLimiter {
  rate: u32,
  window: Duration,
  strategy: OverflowStrategy,
  state: Mutex<LimiterState>,
}

impl RateLimiter {
  /// A limiter allowing `rate` messages per `window`. A zero rate is raised to one.
  pub fn new(rate: u32, window: Duration, strategy: OverflowStrategy) -> Self {
    let bucket = TokenBucket::new(rate, window);
    Self {
      rate: rate.max(1),
      window: bucket.window,
      strategy,
      state: Mutex::new(LimiterState {
        bucket,
        queue: VecDeque::new(),
      }),
    }
  }

  /// Messages allowed per window.
  pub fn rate(&self) -> u32 {
    self.rate
  }

  /// Refill window.
  pub fn window(&self) -> Duration {
    self.window
  }

  /// Configured overflow strategy.
  pub fn strategy(&self) -> OverflowStrategy {
    self.strategy
  }

  /// Tokens available now, after refilling.
  pub fn tokens(&self) -> f64 {
    sync::lock(&self.state).bucket.available()
  }

  /// Messages parked by the queue strategy.
  pub fn queued(&self) -> usize {
    sync::lock(&self.state).queue.len()
  }

  /// Interval at which the drain task forwards parked messages.
  pub fn drain_interval(&self) -> Duration {
    (self.window / self.rate).max(Duration::from_millis(1))
  }

  /// Decides the fate of `msg`.
  ///
  /// `Ok(Some(msg))` forwards it now; `Ok(None)` means it was parked for the
  /// drain task. Only the delay strategy suspends, racing `cancel`.
  pub async fn admit(
    &self,
    cancel: &CancellationToken,
    msg: Message,
  ) -> Result<Option<Message>, AdmissionError> {
    if let OverflowStrategy::Queue { max_size } = self.strategy {
      return self.admit_queued(msg, max_size);
    }
    if sync::lock(&self.state).bucket.try_consume() {
      return Ok(Some(msg));
    }
    trace!(strategy = ?self.strategy, "RateLimiter::admit() bucket empty");

    match self.strategy {
      // queue admissions are settled by admit_queued
      OverflowStrategy::Drop | OverflowStrategy::Queue { .. } => {
        Err(AdmissionError::RateLimitExceeded {
          message: Box::new(self.annotate(msg, "rate_limit_exceeded")),
        })
      }
      OverflowStrategy::Delay => {
        let wait = sync::lock(&self.state).bucket.time_to_next_token();
        tokio::select! {
          biased;
          _ = cancel.cancelled() => return Err(AdmissionError::Cancelled),
          _ = tokio::time::sleep(wait) => {}
        }
        if sync::lock(&self.state).bucket.try_consume() {
          Ok(Some(msg))
        } else {
          Err(AdmissionError::RateLimitExceeded {
            message: Box::new(self.annotate(msg, "rate_limit_exceeded")),
          })
        }
      }
    }
  }

  // Token check and push happen under one lock so arrivals cannot overtake
  // parked messages.
  fn admit_queued(&self, msg: Message, max_size: usize) -> Result<Option<Message>, AdmissionError> {
    let mut state = sync::lock(&self.state);
    if state.queue.is_empty() && state.bucket.try_consume() {
      return Ok(Some(msg));
    }
    if state.queue.len() >= max_size {
      drop(state);
      return Err(AdmissionError::QueueFull {
        message: Box::new(self.annotate(msg, "queue_full")),
      });
    }
    state.queue.push_back(msg);
    trace!(queued = state.queue.len(), "RateLimiter::admit() parked");
    Ok(None)
  }

  /// Takes the oldest parked message if a token is available for it.
  pub fn dequeue(&self) -> Option<Message> {
    let mut state = sync::lock(&self.state);
    if state.queue.is_empty() || !state.bucket.try_consume() {
      return None;
    }
    state.queue.pop_front()
  }

  /// Starts the periodic consumer of the queue strategy.
  ///
  /// Every [`drain_interval`](Self::drain_interval) the oldest parked
  /// message is handed to `forward`, provided a token is available for it.
  /// The task ends when `cancel` fires.
  pub fn spawn_drain<F>(self: &Arc<Self>, cancel: CancellationToken, forward: F) -> JoinHandle<()>
  where
    F: Fn(Message) + Send + 'static,
  {
    let limiter = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(limiter.drain_interval());
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // the first tick completes immediately
      ticker.tick().await;
      loop {
        tokio::select! {
          biased;
          _ = cancel.cancelled() => break,
          _ = ticker.tick() => {
            if let Some(msg) = limiter.dequeue() {
              forward(msg);
            }
          }
        }
      }
      debug!(remaining = limiter.queued(), "rate limit drain stopped");
    })
  }

  fn annotate(&self, msg: Message, reason: &str) -> Message {
    msg.with_metadata(
      "rateLimit",
      json!({
        "reason": reason,
        "rate": self.rate,
        "windowMs": u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX),
      }),
    )
  }
}
