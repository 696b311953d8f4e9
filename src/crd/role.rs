//! # VaultRole CRD
//!
//! Binds a request's `roleRef` to a backend secrets engine mount and role.
//!
//! ```yaml
//! apiVersion: engine.kubevault.dev/v1alpha1
//! kind: VaultRole
//! metadata:
//!   name: postgres-readonly
//!   namespace: demo
//! spec:
//!   engine: Database
//!   path: database
//!   roleName: readonly
//! ```

use super::spec::RequestKind;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Vault secrets engine backing a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum EngineKind {
    Database,
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "GCP")]
    Gcp,
    Azure,
}

impl EngineKind {
    /// Conventional mount path of the engine
    #[must_use]
    pub fn default_path(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
        }
    }

    /// Whether this engine can serve requests of the given kind
    #[must_use]
    pub fn serves(self, kind: RequestKind) -> bool {
        matches!(
            (self, kind),
            (Self::Database, RequestKind::Database)
                | (Self::Aws, RequestKind::Aws)
                | (Self::Gcp, RequestKind::Gcp)
                | (Self::Azure, RequestKind::Azure)
        )
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Database => "Database",
            Self::Aws => "AWS",
            Self::Gcp => "GCP",
            Self::Azure => "Azure",
        })
    }
}

/// Kind of credential the GCP engine issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GcpSecretType {
    /// OAuth2 access token
    #[default]
    AccessToken,
    /// Service account private key
    ServiceAccountKey,
}

/// Backend role referenced by credential requests
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "engine.kubevault.dev",
    version = "v1alpha1",
    kind = "VaultRole",
    namespaced,
    shortname = "vr",
    printcolumn = r#"{"name":"Engine","type":"string","jsonPath":".spec.engine"}"#,
    printcolumn = r#"{"name":"Path","type":"string","jsonPath":".spec.path"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VaultRoleSpec {
    pub engine: EngineKind,
    /// Engine mount path
    /// Defaults to the engine's conventional mount
    #[serde(default)]
    pub path: Option<String>,
    /// Role name in the backend
    /// Defaults to the VaultRole name
    #[serde(default)]
    pub role_name: Option<String>,
    /// GCP only
    #[serde(default)]
    pub secret_type: Option<GcpSecretType>,
}

impl VaultRole {
    /// Engine mount path, without surrounding slashes
    #[must_use]
    pub fn mount_path(&self) -> String {
        self.spec
            .path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.spec.engine.default_path())
            .to_string()
    }

    /// Backend role name
    #[must_use]
    pub fn backend_role_name(&self) -> String {
        self.spec
            .role_name
            .clone()
            .or_else(|| self.metadata.name.clone())
            .unwrap_or_default()
    }
}
