//! # Finalizer Protocol
//!
//! Revokes the request's lease before letting Kubernetes delete it.
//!
//! The secret, Role and RoleBinding are owned by the request and are removed
//! by garbage collection once the finalizer is gone. A revoke failure keeps
//! the finalizer so the lease can never be orphaned.

use super::types::{Context, ReconcilerError};
use crate::crd::AccessRequest;
use crate::observability::metrics;
use crate::store::has_finalizer;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

pub(super) async fn finalize<K: AccessRequest>(
    request: &K,
    ctx: &Context<K>,
    key: &str,
) -> Result<Action, ReconcilerError> {
    if !has_finalizer(request) {
        debug!(request = %key, "Deleted without our finalizer, nothing to do");
        return Ok(Action::await_change());
    }

    let lease_id = request
        .access_status()
        .and_then(|s| s.lease.as_ref())
        .map(|l| l.id.clone())
        .filter(|id| !id.is_empty());

    if let Some(lease_id) = lease_id {
        match ctx.managers.manager_for(request).await {
            Ok(manager) => {
                manager
                    .revoke_lease(&lease_id)
                    .await
                    .map_err(|source| ReconcilerError::RevokeLease {
                        key: key.to_string(),
                        lease_id: lease_id.clone(),
                        source,
                    })?;
                metrics::increment_leases_revoked(K::KIND);
                info!(request = %key, lease_id = %lease_id, "Revoked lease of deleted request");
            }
            Err(e) => {
                // No manager means no lease could have been issued through it
                warn!(
                    request = %key,
                    lease_id = %lease_id,
                    error = %e,
                    "Cannot create credential manager for deleted request, treating as nothing to clean up"
                );
            }
        }
    }

    ctx.store
        .remove_finalizer(request)
        .await
        .map_err(ReconcilerError::store(key, "remove finalizer"))?;
    ctx.retries.reset(key);
    debug!(request = %key, "Removed finalizer");
    Ok(Action::await_change())
}
