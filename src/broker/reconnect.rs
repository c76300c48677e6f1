//! Retry timing after an unexpected loss of the broker link.
//!
//! The scheduler owns at most one timer task. Arming replaces whatever timer
//! was pending; cancelling aborts it. Whether a fired timer is still wanted
//! is decided by the connection manager, which re-checks its epoch and
//! reconnect flag under the state lock before re-attempting.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles per consecutive failure, capped at `max_delay`.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs(5),
            backoff: Backoff::Fixed,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based) since the last success.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.delay
                    .saturating_mul(factor)
                    .min(self.max_delay.max(self.delay))
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ReconnectScheduler {
    policy: ReconnectPolicy,
    pending: Option<JoinHandle<()>>,
    attempts: u32,
}

impl ReconnectScheduler {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            pending: None,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Run `fire` once after the delay for the current attempt, replacing any
    /// pending timer. Returns the delay used.
    pub fn arm<F>(&mut self, fire: F) -> Duration
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.policy.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        }));
        delay
    }

    /// Abort the pending timer, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Called from inside the firing task: forget the handle without
    /// aborting the task that is running.
    pub fn take_fired(&mut self) {
        self.pending = None;
    }

    /// Start the backoff sequence over after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
