//! Reconnect pacing
//!
//! A [`ReconnectHelper`] runs one connect attempt at a time and decides how
//! long to wait before the next one. Drivers use a fixed delay; the policy
//! also supports growing delays with jitter and a bounded number of attempts.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconnectError {
    #[error("gave up after {0} reconnect attempts")]
    MaxAttemptsExceeded(u32),

    #[error("connect failed: {0}")]
    ConnectionFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// 0 retries forever
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay by up to 25% either way
    pub jitter: bool,
}

impl ReconnectPolicy {
    /// Retry forever, `delay` apart
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 0,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

#[derive(Debug)]
pub struct ReconnectHelper {
    policy: ReconnectPolicy,
    /// Attempts since the link was last up
    attempt: u32,
}

impl ReconnectHelper {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn mark_connected(&mut self) {
        self.attempt = 0;
    }

    /// A lost link starts a fresh series; its first attempt does not wait
    pub fn mark_disconnected(&mut self) {
        self.attempt = 0;
        debug!("Link lost, reconnect series reset");
    }

    /// Wait before attempt `attempt + 1`: `initial * multiplier^(attempt-1)`,
    /// capped at `max_delay`
    pub fn calculate_next_delay(&self) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self
            .policy
            .initial_delay
            .as_secs_f64()
            * self.policy.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.policy.max_delay.as_secs_f64());

        let seconds = if self.policy.jitter && capped > 0.0 {
            let spread = capped * 0.25;
            capped + rand::thread_rng().gen_range(-spread..spread)
        } else {
            capped
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Run one attempt, sleeping first unless it opens a series
    pub async fn execute_reconnect<F, Fut, E>(&mut self, mut connect: F) -> Result<(), ReconnectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let limit = self.policy.max_attempts;
        if limit > 0 && self.attempt >= limit {
            return Err(ReconnectError::MaxAttemptsExceeded(limit));
        }

        if self.attempt > 0 {
            tokio::time::sleep(self.calculate_next_delay()).await;
        }
        self.attempt += 1;

        match connect().await {
            Ok(()) => {
                info!(attempt = self.attempt, "Reconnected");
                self.mark_connected();
                Ok(())
            },
            Err(e) => {
                if self.attempt == 1 {
                    warn!("Reconnect attempt failed: {}", e);
                } else {
                    debug!(attempt = self.attempt, "Reconnect attempt failed: {}", e);
                }
                Err(ReconnectError::ConnectionFailed(e.to_string()))
            },
        }
    }
}
