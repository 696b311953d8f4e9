//! # Status Updates
//!
//! Every status write goes through here so `phase` always follows the
//! conditions it is derived from.

use super::types::{Context, ReconcilerError};
use crate::crd::{AccessRequest, AccessRequestStatus, Condition, RequestPhase, CONDITION_FAILED};

/// Apply `mutate`, recompute `phase`, and persist the status
///
/// Returns the object as stored after the write. An unchanged status is not
/// written, which ends the pass without producing a watch event.
pub(super) async fn update_status<K, F>(
    ctx: &Context<K>,
    request: &K,
    key: &str,
    action: &'static str,
    mutate: F,
) -> Result<K, ReconcilerError>
where
    K: AccessRequest,
    F: Fn(&mut AccessRequestStatus) + Send + Sync,
{
    let refresh = move |status: &mut AccessRequestStatus| {
        mutate(status);
        status.phase = Some(status.derived_phase());
    };
    ctx.store
        .update_status(request, &refresh)
        .await
        .map_err(ReconcilerError::store(key, action))
}

/// Set `WaitingForApproval` on a request that has no phase yet
pub(super) async fn mark_waiting_for_approval<K: AccessRequest>(
    ctx: &Context<K>,
    request: &K,
    key: &str,
) -> Result<K, ReconcilerError> {
    let mark = |status: &mut AccessRequestStatus| {
        if status.phase.is_none() {
            status.phase = Some(RequestPhase::WaitingForApproval);
        }
    };
    ctx.store
        .update_status(request, &mark)
        .await
        .map_err(ReconcilerError::store(key, "mark request as waiting for approval"))
}

/// Record a `Failed` condition with `reason`
pub(super) async fn record_failure<K: AccessRequest>(
    ctx: &Context<K>,
    request: &K,
    key: &str,
    reason: &'static str,
    message: String,
    observed_generation: Option<i64>,
) -> Result<K, ReconcilerError> {
    update_status(ctx, request, key, "record failure", move |status| {
        status.set_condition(Condition::new(CONDITION_FAILED, true, reason, message.clone()));
        if observed_generation.is_some() {
            status.observed_generation = observed_generation;
        }
    })
    .await
}
