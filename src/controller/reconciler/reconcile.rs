//! # Reconcile
//!
//! Entry point of a reconciliation pass. Walks the request through:
//!
//! 1. Deletion: run the finalizer protocol
//! 2. Finalizer bootstrap: add the finalizer before anything is issued
//! 3. Approval gate: wait, stop on denial, or continue when approved
//! 4. Issuance (see `issue`)

use super::disposition::Disposition;
use super::finalize::finalize;
use super::issue::issue;
use super::status::mark_waiting_for_approval;
use super::types::{Context, ReconcilerError};
use crate::controller::queue::RetryEpoch;
use crate::crd::AccessRequest;
use crate::observability::metrics;
use crate::store::{has_finalizer, request_key};
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Reconcile one credential request
///
/// # Errors
///
/// Returns an error when a backend or store call fails; the controller
/// requeues the key according to the error policy.
pub async fn reconcile<K: AccessRequest>(
    request: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<Action, ReconcilerError> {
    let key = request_key(request.as_ref());
    let generation = request.meta().generation.unwrap_or(0);
    let observed_generation = request
        .access_status()
        .and_then(|s| s.observed_generation)
        .unwrap_or(0);

    let span = tracing::info_span!(
        "reconcile",
        kind = K::KIND.label(),
        request = %key,
        generation,
        observed_generation,
    );

    let epoch = RetryEpoch::of(request.meta());

    async move {
        if ctx.retries.exhausted(&key, epoch) {
            debug!(deleting = epoch.deleting, "Retries exhausted for this generation, dropping");
            return Ok(Action::await_change());
        }

        let start = Instant::now();
        metrics::increment_reconciliations(K::KIND);

        let result = reconcile_request(request.as_ref(), &ctx, &key).await;

        metrics::observe_reconciliation_duration(K::KIND, start.elapsed().as_secs_f64());
        if result.is_ok() {
            ctx.retries.reset(&key);
        }
        result
    }
    .instrument(span)
    .await
}

async fn reconcile_request<K: AccessRequest>(
    request: &K,
    ctx: &Context<K>,
    key: &str,
) -> Result<Action, ReconcilerError> {
    if request.meta().deletion_timestamp.is_some() {
        return finalize(request, ctx, key).await;
    }

    if !has_finalizer(request) {
        ctx.store
            .add_finalizer(request)
            .await
            .map_err(ReconcilerError::store(key, "add finalizer"))?;
        debug!("Added finalizer, waiting for the update to be delivered");
        return Ok(Action::await_change());
    }

    let status = request.access_status().cloned().unwrap_or_default();
    match Disposition::from_status(&status) {
        Err(e) => {
            warn!(error = %e, "Ignoring request with conflicting approval conditions");
            Ok(Action::await_change())
        }
        Ok(Disposition::Pending) => {
            mark_waiting_for_approval(ctx, request, key).await?;
            Ok(Action::await_change())
        }
        Ok(Disposition::Denied) => {
            info!("Request denied, no credentials will be issued");
            Ok(Action::await_change())
        }
        Ok(Disposition::Approved) => issue(request, ctx, key).await,
    }
}
