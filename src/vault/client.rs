//! Vault HTTP client with a cached login token.

use super::{auth, SecretResponse, VaultError};
use crate::config::VaultConfig;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Vault API client
///
/// Shared by every credential manager through an `Arc`. The client token is
/// obtained lazily and cached until Vault answers `403`.
pub struct VaultClient {
    http_client: Client,
    base_url: String,
    config: VaultConfig,
    token: RwLock<Option<Zeroizing<String>>>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Create a client for the configured Vault
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not an http(s) URL or the HTTP
    /// client cannot be built.
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let base_url = config.address.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(VaultError::InvalidAddress(config.address.clone()));
        }
        if config.token.is_none() && config.auth_role.is_none() {
            return Err(VaultError::MissingAuthRole);
        }

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            config,
            token: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.base_url
    }

    /// `GET /v1/<path>`
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Vault returns no body.
    pub async fn read(&self, path: &str) -> Result<SecretResponse, VaultError> {
        self.secret_request(Method::GET, path, None).await
    }

    /// `POST /v1/<path>` with a JSON body
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Vault returns no body.
    pub async fn write(&self, path: &str, body: &Value) -> Result<SecretResponse, VaultError> {
        self.secret_request(Method::POST, path, Some(body)).await
    }

    /// Revoke a lease
    ///
    /// Revoking a lease Vault no longer knows about succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error for any other failure.
    pub async fn revoke_lease(&self, lease_id: &str) -> Result<(), VaultError> {
        let body = json!({ "lease_id": lease_id });
        match self
            .send(Method::PUT, "sys/leases/revoke", Some(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_unknown_lease() => {
                debug!(lease_id = %lease_id, error = %e, "Lease already gone, treating as revoked");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn secret_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<SecretResponse, VaultError> {
        let value = self
            .send(method, path, body)
            .await?
            .ok_or_else(|| VaultError::Decode(format!("empty response for {path}")))?;
        serde_json::from_value(value).map_err(|e| VaultError::Decode(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, VaultError> {
        let token = self.token().await?;
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));

        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .header("X-Vault-Token", token.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = response.text().await?;

        if !status.is_success() {
            if status == StatusCode::FORBIDDEN {
                warn!(method = %method, path = %path, "Vault denied request, dropping cached token");
                self.token.write().await.take();
            }
            return Err(VaultError::from_body(status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| VaultError::Decode(e.to_string()))
    }

    async fn token(&self) -> Result<Zeroizing<String>, VaultError> {
        if let Some(token) = &self.config.token {
            return Ok(Zeroizing::new(token.clone()));
        }
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut cached = self.token.write().await;
        // Another task may have logged in while we waited for the lock
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = auth::login(&self.http_client, &self.base_url, &self.config).await?;
        debug!("Obtained Vault token via Kubernetes auth");
        *cached = Some(token.clone());
        Ok(token)
    }
}
