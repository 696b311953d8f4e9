//! # Error Policy
//!
//! Decides when a failed reconciliation is retried.
//!
//! - Write conflicts are requeued after a short fixed delay and do not count
//!   against the retry budget
//! - Any other failure is requeued with Fibonacci backoff until the key has
//!   failed too often for its generation, then it is dropped. Deletion has a
//!   budget of its own

use crate::controller::queue::{RetryDecision, RetryEpoch};
use crate::controller::reconciler::{Context, ReconcilerError};
use crate::crd::AccessRequest;
use crate::observability::metrics;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error policy passed to `Controller::run`
pub fn handle_reconciliation_error<K: AccessRequest>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Context<K>>,
) -> Action {
    let key = error.key();
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        kind = K::KIND.label(),
        request = key,
    );
    let _error_guard = error_span.enter();

    if error.is_conflict() {
        info!(error = %error, "Write conflict, requeueing to re-read the latest object");
        return Action::requeue(ctx.config.conflict_requeue_duration());
    }

    error!(error = %error, "Reconciliation failed");
    metrics::increment_reconciliation_errors(K::KIND);

    match ctx.retries.record_failure(key, RetryEpoch::of(obj.meta())) {
        RetryDecision::Requeue { delay, attempt } => {
            info!(
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying with Fibonacci backoff"
            );
            Action::requeue(delay)
        }
        RetryDecision::GiveUp { attempts } => {
            warn!(
                attempts,
                "Giving up on request after repeated failures, it stays as recorded in status until its spec changes"
            );
            metrics::increment_requeues_dropped(K::KIND);
            Action::await_change()
        }
    }
}
