//! # Shared Request Spec Types
//!
//! Types common to every credential request kind, and the [`AccessRequest`]
//! trait the reconciler is generic over.

use super::status::AccessRequestStatus;
use k8s_openapi::api::rbac::v1::Subject as RbacSubject;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Reference to the `VaultRole` used to issue credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// Name of the VaultRole
    pub name: String,
    /// Namespace of the VaultRole
    /// Defaults to the request namespace if not specified
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Subject that receives read access to the issued secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// ServiceAccount, User or Group
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Defaults to "" for ServiceAccount and rbac.authorization.k8s.io otherwise
    #[serde(default)]
    pub api_group: Option<String>,
}

impl Subject {
    /// Convert into the RBAC subject written into a RoleBinding
    #[must_use]
    pub fn to_rbac(&self) -> RbacSubject {
        let api_group = self.api_group.clone().or_else(|| {
            (self.kind != "ServiceAccount").then(|| RBAC_API_GROUP.to_string())
        });
        RbacSubject {
            api_group,
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Closed set of credential request kinds handled by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Database,
    Aws,
    Gcp,
    Azure,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [Self::Database, Self::Aws, Self::Gcp, Self::Azure];

    /// Kubernetes kind name of the request CRD
    #[must_use]
    pub fn kind_name(self) -> &'static str {
        match self {
            Self::Database => "DatabaseAccessRequest",
            Self::Aws => "AWSAccessKeyRequest",
            Self::Gcp => "GCPAccessKeyRequest",
            Self::Azure => "AzureAccessKeyRequest",
        }
    }

    /// Short label used in metrics and logs
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
        }
    }

    /// Deterministic name of the Role/RoleBinding guarding a request's secret
    #[must_use]
    pub fn access_role_name(self, namespace: &str, name: &str) -> String {
        format!(
            "{}-{}-{}",
            self.kind_name().to_lowercase(),
            namespace,
            name
        )
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// Per-kind knobs for the backend issue call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueParams {
    /// Issue STS credentials instead of IAM user credentials (AWS)
    pub use_sts: bool,
    /// Requested TTL passed through to the backend when supported
    pub ttl: Option<String>,
}

/// A credential request custom resource
///
/// Implemented by every request CRD so the reconciler, store and credential
/// managers can be written once.
pub trait AccessRequest:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: RequestKind;

    fn role_ref(&self) -> &RoleRef;

    fn subjects(&self) -> &[Subject];

    fn access_status(&self) -> Option<&AccessRequestStatus>;

    fn access_status_mut(&mut self) -> &mut AccessRequestStatus;

    fn issue_params(&self) -> IssueParams {
        IssueParams::default()
    }
}
