//! # Vault Backend
//!
//! Thin HTTP driver for the HashiCorp Vault API.
//!
//! Only what the credential managers need is covered: Kubernetes auth login,
//! logical reads/writes against secrets engines, and lease revocation.

mod auth;
mod client;

pub use client::VaultClient;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned by the Vault driver
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Vault returned {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Vault login failed: {0}")]
    Login(String),
    #[error("Failed to read service account token {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Vault Kubernetes auth requires VAULT_AUTH_ROLE when VAULT_TOKEN is not set")]
    MissingAuthRole,
    #[error("Invalid Vault address: {0}")]
    InvalidAddress(String),
    #[error("Unexpected Vault response: {0}")]
    Decode(String),
}

impl VaultError {
    /// Build a status error from a Vault error body (`{"errors": [...]}`)
    pub(crate) fn from_body(code: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .map(|b| b.errors.join("; "))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());
        Self::Status { code, message }
    }

    /// HTTP status code returned by Vault, if any
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this error says the lease does not exist (already revoked or expired)
    #[must_use]
    pub fn is_unknown_lease(&self) -> bool {
        match self {
            Self::Status { code: 400, message } => {
                let message = message.to_lowercase();
                message.contains("invalid lease") || message.contains("lease not found")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Response to a logical read or write
#[derive(Clone, Default, Deserialize)]
pub struct SecretResponse {
    #[serde(default)]
    pub lease_id: String,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl std::fmt::Debug for SecretResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&String> = self.data.iter().flat_map(Map::keys).collect();
        f.debug_struct("SecretResponse")
            .field("lease_id", &self.lease_id)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("data_keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_is_joined() {
        let err = VaultError::from_body(400, r#"{"errors":["invalid lease ID","second"]}"#);
        match &err {
            VaultError::Status { code, message } => {
                assert_eq!(*code, 400);
                assert_eq!(message, "invalid lease ID; second");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_unknown_lease());
    }

    #[test]
    fn test_non_json_error_body_is_kept() {
        let err = VaultError::from_body(502, "bad gateway\n");
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.to_string(), "Vault returned 502: bad gateway");
        assert!(!err.is_unknown_lease());
    }

    #[test]
    fn test_lease_not_found_requires_400() {
        let err = VaultError::Status {
            code: 500,
            message: "lease not found".to_string(),
        };
        assert!(!err.is_unknown_lease());
    }

    #[test]
    fn test_secret_response_debug_hides_values() {
        let response: SecretResponse = serde_json::from_str(
            r#"{"lease_id":"database/creds/app/abc","lease_duration":3600,"renewable":true,
                "data":{"username":"v-app","password":"hunter2"}}"#,
        )
        .unwrap();
        let rendered = format!("{response:?}");
        assert!(rendered.contains("username"));
        assert!(!rendered.contains("hunter2"));
    }
}
