//! # Reconciler Types
//!
//! Shared context and the error returned to the controller queue.

use crate::config::ControllerConfig;
use crate::controller::queue::RetryTracker;
use crate::credential::{CredentialError, CredentialManagerFactory};
use crate::crd::AccessRequest;
use crate::store::{RequestStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Condition reasons written on failure
pub mod reason {
    pub const FAILED_TO_CREATE_CREDENTIAL_MANAGER: &str = "FailedToCreateCredentialManager";
    pub const FAILED_TO_GET_CREDENTIAL: &str = "FailedToGetCredential";
    pub const FAILED_TO_CREATE_SECRET: &str = "FailedToCreateSecret";
    pub const FAILED_TO_CREATE_ROLE: &str = "FailedToCreateRole";
    pub const FAILED_TO_CREATE_ROLE_BINDING: &str = "FailedToCreateRoleBinding";
    pub const SUCCESSFULLY_ISSUED_CREDENTIAL: &str = "SuccessfullyIssuedCredential";
}

/// Reconciler context shared by every pass for one request kind
pub struct Context<K: AccessRequest> {
    pub store: Arc<dyn RequestStore<K>>,
    pub managers: Arc<dyn CredentialManagerFactory<K>>,
    pub retries: RetryTracker,
    pub config: ControllerConfig,
}

impl<K: AccessRequest> std::fmt::Debug for Context<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("kind", &K::KIND)
            .field("retries", &self.retries)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: AccessRequest> Context<K> {
    #[must_use]
    pub fn new(
        store: Arc<dyn RequestStore<K>>,
        managers: Arc<dyn CredentialManagerFactory<K>>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            managers,
            retries: RetryTracker::from_config(&config),
            config,
        }
    }
}

/// Error returned from a reconciliation pass
///
/// Every variant names the request (`namespace/name`) it came from.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("{key}: failed to create credential manager: {source}")]
    ManagerConstruction {
        key: String,
        #[source]
        source: CredentialError,
    },
    #[error("{key}: failed to get credential: {source}")]
    GetCredential {
        key: String,
        #[source]
        source: CredentialError,
    },
    #[error("{key}: failed to create secret {secret}: {source}")]
    CreateSecret {
        key: String,
        secret: String,
        #[source]
        source: CredentialError,
    },
    #[error("{key}: failed to create role {role}: {source}")]
    CreateRole {
        key: String,
        role: String,
        #[source]
        source: CredentialError,
    },
    #[error("{key}: failed to create role binding {role_binding}: {source}")]
    CreateRoleBinding {
        key: String,
        role_binding: String,
        #[source]
        source: CredentialError,
    },
    #[error("{key}: failed to revoke lease {lease_id}: {source}")]
    RevokeLease {
        key: String,
        lease_id: String,
        #[source]
        source: CredentialError,
    },
    #[error("{key}: lease or secret from an earlier pass still recorded in status")]
    StaleIssuance { key: String },
    #[error("{key}: failed to {action}: {source}")]
    Store {
        key: String,
        action: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("{key}: rolled back after: {cause}")]
    Compensated {
        key: String,
        #[source]
        cause: Box<ReconcilerError>,
    },
    #[error("{key}: compensation failed ({failures}) after: {cause}")]
    CompensationFailed {
        key: String,
        #[source]
        cause: Box<ReconcilerError>,
        failures: Box<ReconcilerError>,
    },
    #[error("{key}: {}", join_errors(.errors))]
    Aggregate {
        key: String,
        errors: Vec<ReconcilerError>,
    },
}

fn join_errors(errors: &[ReconcilerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcilerError {
    pub(crate) fn store<'a>(
        key: &'a str,
        action: &'static str,
    ) -> impl FnOnce(StoreError) -> Self + 'a {
        move |source| Self::Store {
            key: key.to_string(),
            action,
            source,
        }
    }

    /// Whether the pass lost an optimistic-concurrency race
    ///
    /// Conflicts are requeued quickly and do not count against the retry budget.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_conflict())
    }

    /// Request key the error belongs to
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::ManagerConstruction { key, .. }
            | Self::GetCredential { key, .. }
            | Self::CreateSecret { key, .. }
            | Self::CreateRole { key, .. }
            | Self::CreateRoleBinding { key, .. }
            | Self::RevokeLease { key, .. }
            | Self::StaleIssuance { key }
            | Self::Store { key, .. }
            | Self::Compensated { key, .. }
            | Self::CompensationFailed { key, .. }
            | Self::Aggregate { key, .. } => key,
        }
    }
}
