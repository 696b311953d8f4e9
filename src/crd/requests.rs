//! # Credential Request CRDs
//!
//! One custom resource per request kind. All kinds share the
//! [`AccessRequestStatus`] status and the `roleRef`/`subjects` spec fields.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: engine.kubevault.dev/v1alpha1
//! kind: DatabaseAccessRequest
//! metadata:
//!   name: app-db-access
//!   namespace: demo
//! spec:
//!   roleRef:
//!     name: postgres-readonly
//!   subjects:
//!     - kind: ServiceAccount
//!       name: app
//!       namespace: demo
//! ```

use super::spec::{AccessRequest, IssueParams, RequestKind, RoleRef, Subject};
use super::status::AccessRequestStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_rules! impl_access_request {
    ($ty:ty, $kind:expr; $($extra:tt)*) => {
        impl AccessRequest for $ty {
            const KIND: RequestKind = $kind;

            fn role_ref(&self) -> &RoleRef {
                &self.spec.role_ref
            }

            fn subjects(&self) -> &[Subject] {
                &self.spec.subjects
            }

            fn access_status(&self) -> Option<&AccessRequestStatus> {
                self.status.as_ref()
            }

            fn access_status_mut(&mut self) -> &mut AccessRequestStatus {
                self.status.get_or_insert_with(AccessRequestStatus::default)
            }

            $($extra)*
        }
    };
}

/// Request for short-lived database credentials
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "engine.kubevault.dev",
    version = "v1alpha1",
    kind = "DatabaseAccessRequest",
    namespaced,
    status = "AccessRequestStatus",
    shortname = "dbaccess",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.secret.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccessRequestSpec {
    /// VaultRole with a Database engine
    pub role_ref: RoleRef,
    /// Subjects granted read access to the issued secret
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl_access_request!(DatabaseAccessRequest, RequestKind::Database;);

/// Request for AWS access keys (IAM user or STS)
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "engine.kubevault.dev",
    version = "v1alpha1",
    kind = "AWSAccessKeyRequest",
    root = "AwsAccessKeyRequest",
    namespaced,
    status = "AccessRequestStatus",
    shortname = "awsaccess",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.secret.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccessKeyRequestSpec {
    /// VaultRole with an AWS engine
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Issue temporary STS credentials instead of an IAM user
    #[serde(default, rename = "useSTS")]
    pub use_sts: bool,
    /// TTL for STS credentials, e.g. "1h"
    #[serde(default)]
    pub ttl: Option<String>,
}

impl_access_request!(
    AwsAccessKeyRequest,
    RequestKind::Aws;
    fn issue_params(&self) -> IssueParams {
        IssueParams {
            use_sts: self.spec.use_sts,
            ttl: self.spec.ttl.clone(),
        }
    }
);

/// Request for a GCP OAuth token or service account key
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "engine.kubevault.dev",
    version = "v1alpha1",
    kind = "GCPAccessKeyRequest",
    root = "GcpAccessKeyRequest",
    namespaced,
    status = "AccessRequestStatus",
    shortname = "gcpaccess",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.secret.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GcpAccessKeyRequestSpec {
    /// VaultRole with a GCP engine
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl_access_request!(GcpAccessKeyRequest, RequestKind::Gcp;);

/// Request for an Azure service principal credential
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "engine.kubevault.dev",
    version = "v1alpha1",
    kind = "AzureAccessKeyRequest",
    namespaced,
    status = "AccessRequestStatus",
    shortname = "azureaccess",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.secret.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureAccessKeyRequestSpec {
    /// VaultRole with an Azure engine
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl_access_request!(AzureAccessKeyRequest, RequestKind::Azure;);
