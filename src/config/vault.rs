//! # Vault Configuration
//!
//! Connection settings for the Vault backend.

use super::{env_var_opt, env_var_or_default, env_var_or_default_str};
use crate::constants::{
    DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH, DEFAULT_VAULT_AUTH_PATH, DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
};
use std::time::Duration;

/// Vault connection configuration
///
/// Either `token` is set, or the controller logs in with Kubernetes auth using
/// `auth_role` and the service account token at `jwt_path`.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Vault address, e.g. `https://vault.vault.svc:8200`
    pub address: String,
    /// Static token, skips Kubernetes auth when set
    pub token: Option<String>,
    /// Kubernetes auth mount path
    pub auth_path: String,
    /// Vault role for Kubernetes auth
    pub auth_role: Option<String>,
    /// Service account token file
    pub jwt_path: String,
    /// Timeout for a single HTTP request (seconds)
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auth_path", &self.auth_path)
            .field("auth_role", &self.auth_role)
            .field("jwt_path", &self.jwt_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl VaultConfig {
    /// Config for a Vault at `address` using Kubernetes auth defaults
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            auth_path: DEFAULT_VAULT_AUTH_PATH.to_string(),
            auth_role: None,
            jwt_path: DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
            request_timeout_secs: DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Load Vault configuration from environment variables
    ///
    /// Returns `None` when `VAULT_ADDR` is not set. Requests are then failed
    /// at credential manager construction.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let address = env_var_opt("VAULT_ADDR")?;
        Some(Self {
            address,
            token: env_var_opt("VAULT_TOKEN"),
            auth_path: env_var_or_default_str("VAULT_AUTH_PATH", DEFAULT_VAULT_AUTH_PATH),
            auth_role: env_var_opt("VAULT_AUTH_ROLE"),
            jwt_path: env_var_or_default_str("VAULT_JWT_PATH", DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH),
            request_timeout_secs: env_var_or_default(
                "VAULT_REQUEST_TIMEOUT_SECS",
                DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
            ),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_auth_role(mut self, role: impl Into<String>) -> Self {
        self.auth_role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_jwt_path(mut self, path: impl Into<String>) -> Self {
        self.jwt_path = path.into();
        self
    }

    /// Get request timeout duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
