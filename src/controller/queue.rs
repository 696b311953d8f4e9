//! # Retry Tracker
//!
//! Bounded retry on top of the `kube_runtime` controller queue.
//!
//! The controller queue already deduplicates keys and runs at most one
//! reconciliation per key at a time. This tracker adds the attempt limit:
//! each failing key gets a Fibonacci backoff, and once it has failed more
//! than `max_attempts` times in the same [`RetryEpoch`] it is dropped. From
//! then on the failure is only visible in the object's status. A new
//! generation, the start of deletion or a successful pass starts the count
//! again.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The object state a retry budget belongs to
///
/// Marking an object for deletion does not bump its generation, so deletion
/// is tracked separately and always gets a budget of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryEpoch {
    pub generation: i64,
    pub deleting: bool,
}

impl RetryEpoch {
    #[must_use]
    pub fn of(meta: &ObjectMeta) -> Self {
        Self {
            generation: meta.generation.unwrap_or(0),
            deleting: meta.deletion_timestamp.is_some(),
        }
    }

    #[must_use]
    pub const fn deleting(generation: i64) -> Self {
        Self {
            generation,
            deleting: true,
        }
    }
}

impl From<i64> for RetryEpoch {
    fn from(generation: i64) -> Self {
        Self {
            generation,
            deleting: false,
        }
    }
}

/// What to do with a key after a failed pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after `delay`; `attempt` counts failures in this epoch
    Requeue { delay: Duration, attempt: u32 },
    /// Retry budget exhausted, drop the key
    GiveUp { attempts: u32 },
}

#[derive(Debug)]
struct RetryState {
    epoch: RetryEpoch,
    attempts: u32,
    backoff: FibonacciBackoff,
}

/// Per-key failure counts and backoff
#[derive(Debug)]
pub struct RetryTracker {
    max_attempts: u32,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
    states: Mutex<HashMap<String, RetryState>>,
}

impl RetryTracker {
    #[must_use]
    pub fn new(max_attempts: u32, backoff_min_secs: u64, backoff_max_secs: u64) -> Self {
        Self {
            max_attempts,
            backoff_min_secs,
            backoff_max_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.max_num_requeues,
            config.backoff_min_secs,
            config.backoff_max_secs,
        )
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, RetryState>> {
        // The map holds plain counters, a panic mid-update cannot corrupt it
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failed pass for `key` in `epoch`
    pub fn record_failure(&self, key: &str, epoch: impl Into<RetryEpoch>) -> RetryDecision {
        let epoch = epoch.into();
        let mut states = self.states();
        let state = states.entry(key.to_string()).or_insert_with(|| RetryState {
            epoch,
            attempts: 0,
            backoff: FibonacciBackoff::new(self.backoff_min_secs, self.backoff_max_secs),
        });

        if state.epoch != epoch {
            state.epoch = epoch;
            state.attempts = 0;
            state.backoff.reset();
        }

        state.attempts = state.attempts.saturating_add(1);
        if state.attempts > self.max_attempts {
            RetryDecision::GiveUp {
                attempts: state.attempts,
            }
        } else {
            RetryDecision::Requeue {
                delay: state.backoff.next_backoff(),
                attempt: state.attempts,
            }
        }
    }

    /// Whether `key` already gave up in `epoch`
    #[must_use]
    pub fn exhausted(&self, key: &str, epoch: impl Into<RetryEpoch>) -> bool {
        let epoch = epoch.into();
        self.states()
            .get(key)
            .is_some_and(|s| s.epoch == epoch && s.attempts > self.max_attempts)
    }

    /// Forget `key` after a successful pass, finalization or removal
    pub fn reset(&self, key: &str) {
        self.states().remove(key);
    }

    /// Failures recorded for `key` in its current epoch
    #[must_use]
    pub fn attempts(&self, key: &str) -> u32 {
        self.states().get(key).map_or(0, |s| s.attempts)
    }
}
