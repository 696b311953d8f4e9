//! # Credential Managers
//!
//! The [`CredentialManager`] abstraction the reconciler drives, and its Vault
//! implementation.
//!
//! A manager is constructed per request by a [`CredentialManagerFactory`].
//! Construction resolves the request's `VaultRole` and selects the
//! [`SecretEngine`]; it fails with a construction error when the role is
//! missing, serves a different request kind, or no backend is configured.

mod engine;
mod factory;
mod manager;

pub use engine::{IssueRequest, SecretEngine};
pub use factory::VaultManagerFactory;
pub use manager::{issue_credential, VaultCredentialManager};

use crate::crd::{AccessRequest, EngineKind, RequestKind, Subject};
use crate::vault::VaultError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use zeroize::Zeroize;

#[cfg(test)]
use mockall::automock;

/// Credential issued by the backend
///
/// Lives only in memory. Values are wiped on drop and never printed.
#[derive(Default)]
pub struct Credential {
    pub data: BTreeMap<String, String>,
    /// Empty for credentials without a lease
    pub lease_id: String,
    pub lease_duration_seconds: u64,
    pub renewable: bool,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("data", &self.data.keys().collect::<Vec<_>>())
            .field("lease_id", &self.lease_id)
            .field("lease_duration_seconds", &self.lease_duration_seconds)
            .field("renewable", &self.renewable)
            .finish()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        for value in self.data.values_mut() {
            value.zeroize();
        }
    }
}

/// Errors from credential manager construction and operations
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("VaultRole {namespace}/{name} not found")]
    RoleNotFound { namespace: String, name: String },
    #[error("Failed to get VaultRole {namespace}/{name}: {source}")]
    RoleLookup {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("VaultRole {namespace}/{name} uses the {engine} engine, which cannot serve {kind}")]
    RoleKindMismatch {
        namespace: String,
        name: String,
        engine: EngineKind,
        kind: RequestKind,
    },
    #[error("No Vault backend is configured")]
    MissingBackend,
    #[error("Request has no uid, cannot own issued objects")]
    MissingOwnerReference,
    #[error(transparent)]
    Backend(#[from] VaultError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Credential read from {path} is missing required key {key}")]
    MalformedCredential { path: String, key: String },
}

impl CredentialError {
    /// Whether the error came from manager construction rather than an operation
    #[must_use]
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::RoleNotFound { .. }
                | Self::RoleLookup { .. }
                | Self::RoleKindMismatch { .. }
                | Self::MissingBackend
                | Self::MissingOwnerReference
        )
    }
}

/// Issues, wires up, and revokes credentials for one request
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialManager: Send + Sync {
    /// Issue a fresh credential from the backend
    async fn get_credential(&self) -> Result<Credential, CredentialError>;

    /// Store the credential as a secret owned by the request
    async fn create_secret(
        &self,
        name: &str,
        namespace: &str,
        credential: &Credential,
    ) -> Result<(), CredentialError>;

    /// Create or update a Role granting `get` on exactly `secret_name`
    async fn create_role(
        &self,
        name: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<(), CredentialError>;

    /// Create or update a RoleBinding of `role_name` to the subjects
    async fn create_role_binding(
        &self,
        name: &str,
        namespace: &str,
        role_name: &str,
        subjects: &[Subject],
    ) -> Result<(), CredentialError>;

    /// Revoke a lease. Unknown or already revoked leases succeed.
    async fn revoke_lease(&self, lease_id: &str) -> Result<(), CredentialError>;
}

/// Builds the credential manager for a request
#[async_trait]
pub trait CredentialManagerFactory<K: AccessRequest>: Send + Sync {
    async fn manager_for(&self, request: &K) -> Result<Box<dyn CredentialManager>, CredentialError>;
}

/// Name for a newly issued secret: `<request-name>-<6 lowercase alphanumerics>`
#[must_use]
pub fn generate_secret_name(request_name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{request_name}-{}",
        &suffix[..crate::constants::SECRET_NAME_SUFFIX_LEN]
    )
}
