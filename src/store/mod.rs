//! # Request Store
//!
//! Persistence for credential requests: finalizers, status, and cleanup of
//! issued secrets.
//!
//! Every write carries the `resourceVersion` the controller last read, so a
//! concurrent modification surfaces as [`StoreError::Conflict`] instead of a
//! blind overwrite. The pass then aborts and the object is re-read on the
//! next delivery.

use crate::constants::FINALIZER;
use crate::crd::{AccessRequest, AccessRequestStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Errors returned by a [`RequestStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict writing {key}: object was modified concurrently")]
    Conflict { key: String },
    #[error("Kubernetes API error for {key}: {source}")]
    Api {
        key: String,
        #[source]
        source: kube::Error,
    },
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    fn from_kube(key: String, source: kube::Error) -> Self {
        match source {
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict { key },
            source => Self::Api { key, source },
        }
    }
}

/// Status mutation applied by [`RequestStore::update_status`]
pub type StatusMutation<'a> = &'a (dyn Fn(&mut AccessRequestStatus) + Send + Sync);

/// Resource store holding credential requests
#[async_trait]
pub trait RequestStore<K: AccessRequest>: Send + Sync {
    /// Add the controller finalizer, returning the updated object
    async fn add_finalizer(&self, request: &K) -> Result<K, StoreError>;

    /// Remove the controller finalizer, returning the updated object
    async fn remove_finalizer(&self, request: &K) -> Result<K, StoreError>;

    /// Apply `mutate` to the request status and persist the result
    ///
    /// When the mutation leaves the status unchanged nothing is written and
    /// `request` is returned as is.
    async fn update_status(&self, request: &K, mutate: StatusMutation<'_>) -> Result<K, StoreError>;

    /// Delete a secret in the request namespace. A missing secret is not an error.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// `namespace/name` of a request
#[must_use]
pub fn request_key<K: AccessRequest>(request: &K) -> String {
    format!(
        "{}/{}",
        request.namespace().unwrap_or_default(),
        request.name_any()
    )
}

/// Whether the controller finalizer is present
#[must_use]
pub fn has_finalizer<K: AccessRequest>(request: &K) -> bool {
    request.finalizers().iter().any(|f| f == FINALIZER)
}

/// Status after applying `mutate`, or `None` if it would not change
#[must_use]
pub fn mutated_status<K: AccessRequest>(
    request: &K,
    mutate: StatusMutation<'_>,
) -> Option<AccessRequestStatus> {
    let current = request.access_status().cloned().unwrap_or_default();
    let mut next = current.clone();
    mutate(&mut next);
    (next != current).then_some(next)
}

/// [`RequestStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeRequestStore {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeRequestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRequestStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeRequestStore {
    #[must_use]
    pub fn new(client: Client, field_manager: String) -> Self {
        Self {
            client,
            field_manager,
        }
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..PatchParams::default()
        }
    }

    fn api<K: AccessRequest>(&self, request: &K) -> Api<K> {
        Api::namespaced(
            self.client.clone(),
            &request.namespace().unwrap_or_default(),
        )
    }

    async fn patch_finalizers<K: AccessRequest>(
        &self,
        request: &K,
        finalizers: Vec<String>,
    ) -> Result<K, StoreError> {
        let key = request_key(request);
        let patch = json!({
            "metadata": {
                "resourceVersion": request.resource_version(),
                "finalizers": finalizers,
            }
        });
        self.api(request)
            .patch(
                &request.name_any(),
                &self.patch_params(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| StoreError::from_kube(key, e))
    }
}

#[async_trait]
impl<K: AccessRequest> RequestStore<K> for KubeRequestStore {
    async fn add_finalizer(&self, request: &K) -> Result<K, StoreError> {
        let mut finalizers = request.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        debug!(request = %request_key(request), "Adding finalizer");
        self.patch_finalizers(request, finalizers).await
    }

    async fn remove_finalizer(&self, request: &K) -> Result<K, StoreError> {
        let finalizers: Vec<String> = request
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        debug!(request = %request_key(request), "Removing finalizer");
        self.patch_finalizers(request, finalizers).await
    }

    async fn update_status(&self, request: &K, mutate: StatusMutation<'_>) -> Result<K, StoreError> {
        let Some(status) = mutated_status(request, mutate) else {
            return Ok(request.clone());
        };

        let key = request_key(request);
        let patch = json!({
            "metadata": { "resourceVersion": request.resource_version() },
            "status": status,
        });
        self.api(request)
            .patch_status(
                &request.name_any(),
                &self.patch_params(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| StoreError::from_kube(key, e))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(secret = %name, namespace = %namespace, "Secret already deleted");
                Ok(())
            }
            Err(e) => Err(StoreError::from_kube(format!("{namespace}/{name}"), e)),
        }
    }
}
