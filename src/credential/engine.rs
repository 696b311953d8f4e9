//! # Secret Engines
//!
//! Per-engine issue requests and credential validation.

use super::{Credential, CredentialError};
use crate::crd::{EngineKind, GcpSecretType, IssueParams, VaultRole};
use crate::vault::SecretResponse;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Vault secrets engine a manager issues from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretEngine {
    Database,
    Aws { use_sts: bool, ttl: Option<String> },
    Gcp { secret_type: GcpSecretType },
    Azure,
}

/// HTTP call that issues a credential
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    /// Path under `/v1/`
    pub path: String,
    /// `None` issues with a read, `Some` with a write of this body
    pub body: Option<Value>,
}

impl SecretEngine {
    #[must_use]
    pub fn for_role(role: &VaultRole, params: &IssueParams) -> Self {
        match role.spec.engine {
            EngineKind::Database => Self::Database,
            EngineKind::Aws => Self::Aws {
                use_sts: params.use_sts,
                ttl: params.ttl.clone(),
            },
            EngineKind::Gcp => Self::Gcp {
                secret_type: role.spec.secret_type.unwrap_or_default(),
            },
            EngineKind::Azure => Self::Azure,
        }
    }

    #[must_use]
    pub fn issue_request(&self, mount: &str, role: &str) -> IssueRequest {
        match self {
            Self::Database | Self::Azure | Self::Aws { use_sts: false, .. } => IssueRequest {
                path: format!("{mount}/creds/{role}"),
                body: None,
            },
            Self::Aws { use_sts: true, ttl } => IssueRequest {
                path: format!("{mount}/sts/{role}"),
                body: Some(ttl.as_ref().map_or_else(|| json!({}), |ttl| json!({ "ttl": ttl }))),
            },
            Self::Gcp {
                secret_type: GcpSecretType::AccessToken,
            } => IssueRequest {
                path: format!("{mount}/roleset/{role}/token"),
                body: None,
            },
            Self::Gcp {
                secret_type: GcpSecretType::ServiceAccountKey,
            } => IssueRequest {
                path: format!("{mount}/roleset/{role}/key"),
                body: None,
            },
        }
    }

    /// Keys the issued data must contain
    #[must_use]
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Database => &["username", "password"],
            Self::Aws { .. } => &["access_key", "secret_key"],
            Self::Gcp {
                secret_type: GcpSecretType::AccessToken,
            } => &["token"],
            Self::Gcp {
                secret_type: GcpSecretType::ServiceAccountKey,
            } => &["private_key_data"],
            Self::Azure => &["client_id", "client_secret"],
        }
    }

    /// Turn a backend response into a credential
    ///
    /// # Errors
    ///
    /// Returns `MalformedCredential` when a required key is missing or empty.
    pub fn credential_from(
        &self,
        path: &str,
        response: SecretResponse,
    ) -> Result<Credential, CredentialError> {
        let data: BTreeMap<String, String> = response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, stringify(value)))
            .collect();

        let credential = Credential {
            data,
            lease_id: response.lease_id,
            lease_duration_seconds: response.lease_duration,
            renewable: response.renewable,
        };

        if let Some(key) = self
            .required_keys()
            .iter()
            .find(|key| credential.data.get(**key).is_none_or(String::is_empty))
        {
            return Err(CredentialError::MalformedCredential {
                path: path.to_string(),
                key: (*key).to_string(),
            });
        }
        Ok(credential)
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
