//! # Watch Loop
//!
//! Runs one `kube_runtime` controller for a request kind.
//!
//! The controller queue deduplicates keys, so at most one pass per request
//! runs at a time, and up to `num_workers` requests of the kind are
//! reconciled concurrently.

use crate::controller::reconciler::{reconcile, Context, ReconcilerError};
use crate::crd::AccessRequest;
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Watch every request of kind `K` across all namespaces until shutdown
///
/// # Errors
///
/// Never fails today; returns `Result` so callers can `try_join!` the loops.
pub async fn run_watch_loop<K: AccessRequest>(
    client: Client,
    ctx: Arc<Context<K>>,
) -> Result<(), anyhow::Error> {
    let kind = K::KIND.kind_name();
    let requests: Api<K> = Api::all(client);
    let config = controller::Config::default().concurrency(ctx.config.num_workers);

    info!(kind, workers = ctx.config.num_workers, "Starting controller watch loop...");

    Controller::new(requests, watcher::Config::default().any_semantic())
        .with_config(config)
        .shutdown_on_signal()
        .run(
            reconcile::<K>,
            handle_reconciliation_error::<K>,
            Arc::clone(&ctx),
        )
        .for_each(|result| {
            handle_outcome(result, &ctx);
            futures::future::ready(())
        })
        .await;

    info!(kind, "Controller stopped gracefully");
    Ok(())
}

type Outcome<K> = Result<
    (ObjectRef<K>, Action),
    controller::Error<ReconcilerError, watcher::Error>,
>;

fn handle_outcome<K: AccessRequest>(result: Outcome<K>, ctx: &Context<K>) {
    let kind = K::KIND.kind_name();
    match result {
        Ok((object, _)) => debug!(kind, request = %object, "Reconciled"),
        // Already logged and counted by the error policy
        Err(controller::Error::ReconcilerFailed(e, _)) => {
            debug!(kind, error = %e, "Reconciliation failed");
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            debug!(kind, request = %object, "Request no longer exists");
            ctx.retries.reset(&object_key(&object));
        }
        Err(controller::Error::QueueError(e)) => {
            error!(kind, error = %e, "Watch stream error");
        }
        Err(e) => warn!(kind, error = %e, "Controller error"),
    }
}

/// Same key as `request_key` for an object that is no longer in the cache
fn object_key<K: kube_runtime::reflector::Lookup + ?Sized>(object: &ObjectRef<K>) -> String {
    format!(
        "{}/{}",
        object.namespace.as_deref().unwrap_or_default(),
        object.name
    )
}
