//! Resolves the `VaultRole` behind a request and builds its manager.

use super::{CredentialError, CredentialManager, CredentialManagerFactory, SecretEngine, VaultCredentialManager};
use crate::crd::{AccessRequest, VaultRole};
use crate::vault::VaultClient;
use async_trait::async_trait;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::debug;

/// Builds [`VaultCredentialManager`]s from the request's `roleRef`
#[derive(Clone)]
pub struct VaultManagerFactory {
    client: Client,
    vault: Option<Arc<VaultClient>>,
    field_manager: String,
}

impl std::fmt::Debug for VaultManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultManagerFactory")
            .field("vault", &self.vault)
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl VaultManagerFactory {
    /// `vault` is `None` when no backend is configured; every construction then fails.
    #[must_use]
    pub fn new(client: Client, vault: Option<Arc<VaultClient>>, field_manager: String) -> Self {
        Self {
            client,
            vault,
            field_manager,
        }
    }

    async fn resolve_role<K: AccessRequest>(&self, request: &K) -> Result<VaultRole, CredentialError> {
        let role_ref = request.role_ref();
        let namespace = role_ref
            .namespace
            .clone()
            .or_else(|| request.namespace())
            .unwrap_or_default();

        let api: Api<VaultRole> = Api::namespaced(self.client.clone(), &namespace);
        let role = api
            .get_opt(&role_ref.name)
            .await
            .map_err(|source| CredentialError::RoleLookup {
                namespace: namespace.clone(),
                name: role_ref.name.clone(),
                source,
            })?
            .ok_or_else(|| CredentialError::RoleNotFound {
                namespace: namespace.clone(),
                name: role_ref.name.clone(),
            })?;

        if !role.spec.engine.serves(K::KIND) {
            return Err(CredentialError::RoleKindMismatch {
                namespace,
                name: role_ref.name.clone(),
                engine: role.spec.engine,
                kind: K::KIND,
            });
        }
        Ok(role)
    }
}

#[async_trait]
impl<K: AccessRequest> CredentialManagerFactory<K> for VaultManagerFactory {
    async fn manager_for(&self, request: &K) -> Result<Box<dyn CredentialManager>, CredentialError> {
        let vault = self.vault.clone().ok_or(CredentialError::MissingBackend)?;
        let role = self.resolve_role(request).await?;
        let owner = request
            .controller_owner_ref(&())
            .ok_or(CredentialError::MissingOwnerReference)?;

        let engine = SecretEngine::for_role(&role, &request.issue_params());
        debug!(
            request = %request.name_any(),
            role = %role.name_any(),
            engine = ?engine,
            "Constructed credential manager"
        );

        Ok(Box::new(VaultCredentialManager::new(
            vault,
            self.client.clone(),
            engine,
            role.mount_path(),
            role.backend_role_name(),
            owner,
            self.field_manager.clone(),
        )))
    }
}
