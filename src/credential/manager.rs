//! # Vault Credential Manager
//!
//! Issues credentials from a Vault secrets engine and exposes them through a
//! Kubernetes Secret, Role and RoleBinding owned by the request.

use super::{Credential, CredentialError, CredentialManager, SecretEngine};
use crate::constants::{
    MANAGED_BY_LABEL, MAX_LABEL_VALUE_LENGTH, REQUEST_NAME_ANNOTATION, REQUEST_NAME_LABEL,
};
use crate::crd::Subject;
use crate::vault::VaultClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Credential manager backed by one Vault role
pub struct VaultCredentialManager {
    vault: Arc<VaultClient>,
    client: Client,
    engine: SecretEngine,
    mount: String,
    role_name: String,
    owner: OwnerReference,
    field_manager: String,
}

impl std::fmt::Debug for VaultCredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCredentialManager")
            .field("engine", &self.engine)
            .field("mount", &self.mount)
            .field("role_name", &self.role_name)
            .field("owner", &self.owner.name)
            .finish_non_exhaustive()
    }
}

impl VaultCredentialManager {
    #[must_use]
    pub fn new(
        vault: Arc<VaultClient>,
        client: Client,
        engine: SecretEngine,
        mount: String,
        role_name: String,
        owner: OwnerReference,
        field_manager: String,
    ) -> Self {
        Self {
            vault,
            client,
            engine,
            mount,
            role_name,
            owner,
            field_manager,
        }
    }

    fn metadata(&self, name: &str, namespace: &str) -> ObjectMeta {
        owned_metadata(name, namespace, &self.owner, &self.field_manager)
    }
}

/// Metadata for an object owned by a request
///
/// Request names may be longer than a label value allows, so the full name
/// always goes into an annotation and the label is only set when it fits.
fn owned_metadata(
    name: &str,
    namespace: &str,
    owner: &OwnerReference,
    field_manager: &str,
) -> ObjectMeta {
    let mut labels = BTreeMap::from([(MANAGED_BY_LABEL.to_string(), field_manager.to_string())]);
    if owner.name.len() <= MAX_LABEL_VALUE_LENGTH {
        labels.insert(REQUEST_NAME_LABEL.to_string(), owner.name.clone());
    }

    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        owner_references: Some(vec![owner.clone()]),
        labels: Some(labels),
        annotations: Some(BTreeMap::from([(
            REQUEST_NAME_ANNOTATION.to_string(),
            owner.name.clone(),
        )])),
        ..Default::default()
    }
}

/// Issue a credential from `mount`/`role_name` of the engine
///
/// A response that carries a lease but is missing required keys is revoked
/// before the error is returned, nothing else would ever own that lease.
///
/// # Errors
///
/// Returns the Vault error, or `MalformedCredential` for an incomplete response.
pub async fn issue_credential(
    vault: &VaultClient,
    engine: &SecretEngine,
    mount: &str,
    role_name: &str,
) -> Result<Credential, CredentialError> {
    let request = engine.issue_request(mount, role_name);
    debug!(path = %request.path, "Issuing credential from Vault");

    let response = match &request.body {
        Some(body) => vault.write(&request.path, body).await?,
        None => vault.read(&request.path).await?,
    };
    let lease_id = response.lease_id.clone();

    let credential = match engine.credential_from(&request.path, response) {
        Ok(credential) => credential,
        Err(e) => {
            if !lease_id.is_empty() {
                match vault.revoke_lease(&lease_id).await {
                    Ok(()) => info!(lease_id = %lease_id, "Revoked lease of malformed credential"),
                    Err(revoke) => warn!(
                        lease_id = %lease_id,
                        error = %revoke,
                        "Failed to revoke lease of malformed credential"
                    ),
                }
            }
            return Err(e);
        }
    };

    info!(
        path = %request.path,
        lease_id = %credential.lease_id,
        lease_duration_seconds = credential.lease_duration_seconds,
        "Issued credential"
    );
    Ok(credential)
}

#[async_trait]
impl CredentialManager for VaultCredentialManager {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        issue_credential(&self.vault, &self.engine, &self.mount, &self.role_name).await
    }

    async fn create_secret(
        &self,
        name: &str,
        namespace: &str,
        credential: &Credential,
    ) -> Result<(), CredentialError> {
        let secret = Secret {
            metadata: self.metadata(name, namespace),
            string_data: Some(credential.data.clone()),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), &secret).await?;
        debug!(secret = %name, namespace = %namespace, "Created credential secret");
        Ok(())
    }

    async fn create_role(
        &self,
        name: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<(), CredentialError> {
        let role = Role {
            metadata: self.metadata(name, namespace),
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["secrets".to_string()]),
                resource_names: Some(vec![secret_name.to_string()]),
                verbs: vec!["get".to_string()],
                ..Default::default()
            }]),
        };

        let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(&self.field_manager).force(),
            &Patch::Apply(&role),
        )
        .await?;
        debug!(role = %name, namespace = %namespace, secret = %secret_name, "Applied Role");
        Ok(())
    }

    async fn create_role_binding(
        &self,
        name: &str,
        namespace: &str,
        role_name: &str,
        subjects: &[Subject],
    ) -> Result<(), CredentialError> {
        let binding = RoleBinding {
            metadata: self.metadata(name, namespace),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
            subjects: Some(subjects.iter().map(Subject::to_rbac).collect()),
        };

        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(&self.field_manager).force(),
            &Patch::Apply(&binding),
        )
        .await?;
        debug!(role_binding = %name, namespace = %namespace, subjects = subjects.len(), "Applied RoleBinding");
        Ok(())
    }

    async fn revoke_lease(&self, lease_id: &str) -> Result<(), CredentialError> {
        if lease_id.is_empty() {
            return Ok(());
        }
        self.vault.revoke_lease(lease_id).await?;
        info!(lease_id = %lease_id, "Revoked lease");
        Ok(())
    }
}
