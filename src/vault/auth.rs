//! Vault Kubernetes auth method.

use super::VaultError;
use crate::config::VaultConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Serialize)]
struct LoginRequest<'a> {
    jwt: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

/// Exchange the service account token for a Vault client token
///
/// `POST /v1/auth/<auth_path>/login {jwt, role}`
pub(super) async fn login(
    http_client: &Client,
    base_url: &str,
    config: &VaultConfig,
) -> Result<Zeroizing<String>, VaultError> {
    let role = config.auth_role.as_deref().ok_or(VaultError::MissingAuthRole)?;

    let jwt = Zeroizing::new(
        tokio::fs::read_to_string(&config.jwt_path)
            .await
            .map_err(|source| VaultError::TokenFile {
                path: config.jwt_path.clone(),
                source,
            })?,
    );

    let url = format!(
        "{base_url}/v1/auth/{}/login",
        config.auth_path.trim_matches('/')
    );
    debug!(url = %url, role = %role, "Logging in to Vault");

    let response = http_client
        .post(&url)
        .json(&LoginRequest {
            jwt: jwt.trim(),
            role,
        })
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(VaultError::from_body(status.as_u16(), &body));
    }

    let parsed: LoginResponse =
        serde_json::from_str(&body).map_err(|e| VaultError::Decode(e.to_string()))?;
    parsed
        .auth
        .map(|auth| Zeroizing::new(auth.client_token))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| VaultError::Login("response carried no client token".to_string()))
}
