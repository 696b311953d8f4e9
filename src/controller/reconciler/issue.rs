//! # Credential Issuance
//!
//! Issues a credential for an approved request and wires it up:
//!
//! 1. Check that no lease or secret from an earlier pass is recorded
//! 2. Get a credential from the backend
//! 3. Store it in a new secret
//! 4. Record `lease` and `secret` in status (durability point)
//! 5. Create the Role and RoleBinding
//! 6. Mark the request `Available`
//!
//! Once step 4 lands, the request owns the lease even if the process dies.
//! Any later failure rolls back (revoke the lease, delete the secret, clear
//! status). If the rollback itself fails, status is left as is so the next
//! delivery retries it from the same point.

use super::status::{record_failure, update_status};
use super::types::{reason, Context, ReconcilerError};
use crate::credential::{generate_secret_name, Credential, CredentialManager};
use crate::crd::{
    AccessRequest, Condition, Lease, SecretReference, CONDITION_AVAILABLE, CONDITION_FAILED,
};
use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, error, info, warn};

/// What a pass created and may have to roll back
#[derive(Debug, Clone, Default)]
struct Issued {
    lease_id: Option<String>,
    secret_name: Option<String>,
}

impl Issued {
    fn new(lease_id: &str, secret_name: Option<&str>) -> Self {
        Self {
            lease_id: (!lease_id.is_empty()).then(|| lease_id.to_string()),
            secret_name: secret_name.map(str::to_string),
        }
    }
}

/// Run issuance for an approved request
pub(super) async fn issue<K: AccessRequest>(
    request: &K,
    ctx: &Context<K>,
    key: &str,
) -> Result<Action, ReconcilerError> {
    let status = request.access_status().cloned().unwrap_or_default();
    if status.is_successfully_processed() {
        debug!(request = %key, "Credentials already issued, nothing to do");
        return Ok(Action::await_change());
    }

    let generation = request.meta().generation;
    let manager = match ctx.managers.manager_for(request).await {
        Ok(manager) => manager,
        Err(source) => {
            // Fatal for this generation, it takes a fix to the request or its VaultRole
            error!(request = %key, error = %source, "Failed to create credential manager");
            record_failure(
                ctx,
                request,
                key,
                reason::FAILED_TO_CREATE_CREDENTIAL_MANAGER,
                source.to_string(),
                generation,
            )
            .await?;
            return Ok(Action::await_change());
        }
    };

    if status.lease.is_some() || status.secret.is_some() {
        warn!(
            request = %key,
            lease = ?status.lease.as_ref().map(|l| &l.id),
            secret = ?status.secret.as_ref().map(|s| &s.name),
            "Found lease or secret from an interrupted pass, rolling back before issuing again"
        );
        let recorded = Issued {
            lease_id: status
                .lease
                .as_ref()
                .map(|l| l.id.clone())
                .filter(|id| !id.is_empty()),
            secret_name: status.secret.as_ref().map(|s| s.name.clone()),
        };
        let stale = ReconcilerError::StaleIssuance {
            key: key.to_string(),
        };
        return Err(match compensate(request, ctx, manager.as_ref(), key, &recorded, true).await {
            Ok(()) => stale,
            Err(failures) => compensation_failed(key, stale, failures),
        });
    }

    // Get credential
    let credential = match manager.get_credential().await {
        Ok(credential) => credential,
        Err(source) => {
            record_failure(
                ctx,
                request,
                key,
                reason::FAILED_TO_GET_CREDENTIAL,
                source.to_string(),
                None,
            )
            .await?;
            return Err(ReconcilerError::GetCredential {
                key: key.to_string(),
                source,
            });
        }
    };

    // Store credential
    let secret_name = generate_secret_name(&request.name_any());
    let namespace = request.namespace().unwrap_or_default();
    if let Err(source) = manager
        .create_secret(&secret_name, &namespace, &credential)
        .await
    {
        if !credential.lease_id.is_empty() {
            // Best effort, nothing references this lease yet
            match manager.revoke_lease(&credential.lease_id).await {
                Ok(()) => metrics::increment_leases_revoked(K::KIND),
                Err(e) => warn!(
                    request = %key,
                    lease_id = %credential.lease_id,
                    error = %e,
                    "Failed to revoke lease after secret creation failed"
                ),
            }
        }
        record_failure(
            ctx,
            request,
            key,
            reason::FAILED_TO_CREATE_SECRET,
            source.to_string(),
            None,
        )
        .await?;
        return Err(ReconcilerError::CreateSecret {
            key: key.to_string(),
            secret: secret_name,
            source,
        });
    }

    let issued = Issued::new(&credential.lease_id, Some(&secret_name));
    let current = match record_issued(request, ctx, key, &credential, &secret_name).await {
        Ok(current) => current,
        Err(cause) => {
            // Status never recorded the lease, roll back what this pass created
            return Err(rollback(request, ctx, manager.as_ref(), key, &issued, false, cause).await);
        }
    };
    drop(credential);

    let role_name = K::KIND.access_role_name(&namespace, &request.name_any());

    if let Err(source) = manager
        .create_role(&role_name, &namespace, &secret_name)
        .await
    {
        let current = record_failure(
            ctx,
            &current,
            key,
            reason::FAILED_TO_CREATE_ROLE,
            source.to_string(),
            None,
        )
        .await?;
        let cause = ReconcilerError::CreateRole {
            key: key.to_string(),
            role: role_name,
            source,
        };
        return Err(rollback(&current, ctx, manager.as_ref(), key, &issued, true, cause).await);
    }

    if let Err(source) = manager
        .create_role_binding(&role_name, &namespace, &role_name, request.subjects())
        .await
    {
        let current = record_failure(
            ctx,
            &current,
            key,
            reason::FAILED_TO_CREATE_ROLE_BINDING,
            source.to_string(),
            None,
        )
        .await?;
        let cause = ReconcilerError::CreateRoleBinding {
            key: key.to_string(),
            role_binding: role_name,
            source,
        };
        return Err(rollback(&current, ctx, manager.as_ref(), key, &issued, true, cause).await);
    }

    update_status(ctx, &current, key, "mark request available", move |status| {
        status.remove_condition(CONDITION_FAILED);
        status.set_condition(Condition::new(
            CONDITION_AVAILABLE,
            true,
            reason::SUCCESSFULLY_ISSUED_CREDENTIAL,
            "The requested credentials successfully issued.",
        ));
        status.observed_generation = generation;
    })
    .await?;

    metrics::increment_credentials_issued(K::KIND);
    info!(request = %key, secret = %secret_name, role = %role_name, "Credentials issued");
    Ok(Action::await_change())
}

/// Durability point: record lease and secret together
async fn record_issued<K: AccessRequest>(
    request: &K,
    ctx: &Context<K>,
    key: &str,
    credential: &Credential,
    secret_name: &str,
) -> Result<K, ReconcilerError> {
    let lease = Lease::new(
        credential.lease_id.clone(),
        credential.lease_duration_seconds,
        credential.renewable,
    );
    let secret = SecretReference {
        name: secret_name.to_string(),
    };
    update_status(ctx, request, key, "record issued lease and secret", move |status| {
        status.lease = Some(lease.clone());
        status.secret = Some(secret.clone());
    })
    .await
}

/// Compensate for a failed step and wrap `cause` with the outcome
async fn rollback<K: AccessRequest>(
    request: &K,
    ctx: &Context<K>,
    manager: &dyn CredentialManager,
    key: &str,
    issued: &Issued,
    clear_status: bool,
    cause: ReconcilerError,
) -> ReconcilerError {
    warn!(request = %key, error = %cause, "Rolling back issued credential");
    match compensate(request, ctx, manager, key, issued, clear_status).await {
        Ok(()) => ReconcilerError::Compensated {
            key: key.to_string(),
            cause: Box::new(cause),
        },
        Err(failures) => compensation_failed(key, cause, failures),
    }
}

fn compensation_failed(key: &str, cause: ReconcilerError, failures: ReconcilerError) -> ReconcilerError {
    ReconcilerError::CompensationFailed {
        key: key.to_string(),
        cause: Box::new(cause),
        failures: Box::new(failures),
    }
}

/// Revoke the lease and delete the secret, then clear them from status
///
/// If either cleanup action fails, status is not touched and the failures
/// are returned together.
async fn compensate<K: AccessRequest>(
    request: &K,
    ctx: &Context<K>,
    manager: &dyn CredentialManager,
    key: &str,
    issued: &Issued,
    clear_status: bool,
) -> Result<(), ReconcilerError> {
    let mut errors = Vec::new();

    if let Some(lease_id) = &issued.lease_id {
        match manager.revoke_lease(lease_id).await {
            Ok(()) => metrics::increment_leases_revoked(K::KIND),
            Err(source) => errors.push(ReconcilerError::RevokeLease {
                key: key.to_string(),
                lease_id: lease_id.clone(),
                source,
            }),
        }
    }

    if let Some(secret_name) = &issued.secret_name {
        let namespace = request.namespace().unwrap_or_default();
        if let Err(e) = ctx.store.delete_secret(&namespace, secret_name).await {
            errors.push(ReconcilerError::store(key, "delete secret")(e));
        }
    }

    if !errors.is_empty() {
        metrics::increment_compensations(K::KIND, false);
        error!(request = %key, failures = errors.len(), "Compensation failed, leaving status unchanged");
        return Err(ReconcilerError::Aggregate {
            key: key.to_string(),
            errors,
        });
    }
    metrics::increment_compensations(K::KIND, true);

    if clear_status {
        let generation = request.meta().generation;
        update_status(ctx, request, key, "clear rolled back lease and secret", move |status| {
            status.lease = None;
            status.secret = None;
            status.observed_generation = generation;
        })
        .await?;
    }
    debug!(request = %key, "Compensation complete");
    Ok(())
}
