//! # Credential Request Controller
//!
//! A Kubernetes controller that issues short-lived credentials from Vault
//! for approved access requests.
//!
//! ## Overview
//!
//! For each `DatabaseAccessRequest`, `AWSAccessKeyRequest`,
//! `GCPAccessKeyRequest` and `AzureAccessKeyRequest` the controller:
//!
//! 1. Waits until an approver sets the `Approved` or `Denied` condition
//! 2. Issues a credential through the referenced `VaultRole`
//! 3. Stores it in a secret owned by the request
//! 4. Grants the request's subjects read access to that secret
//! 5. Revokes the lease when the request is deleted
//!
//! ## Configuration
//!
//! - `VAULT_ADDR`, `VAULT_TOKEN` or `VAULT_AUTH_ROLE`: Vault backend
//! - `NUM_WORKERS`, `MAX_NUM_REQUEUES`: Queue behavior per request kind
//! - `METRICS_PORT`: Metrics and probe server port
//! - `LOG_LEVEL`, `LOG_FORMAT`, `RUST_LOG`: Logging

use anyhow::Result;
use credential_request_controller::crd::{
    AwsAccessKeyRequest, AzureAccessKeyRequest, DatabaseAccessRequest, GcpAccessKeyRequest,
};
use credential_request_controller::runtime::initialization::initialize;
use credential_request_controller::runtime::watch_loop::run_watch_loop;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    // Fail readiness as soon as shutdown starts
    let shutdown_server_state = Arc::clone(&init.server_state);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal, readiness stays up until the controllers stop");
            return;
        }
        info!("Received shutdown signal, waiting for in-flight reconciliations to complete...");
        shutdown_server_state.set_ready(false);
    });

    let result = tokio::try_join!(
        run_watch_loop(
            init.client.clone(),
            init.context::<DatabaseAccessRequest>()
        ),
        run_watch_loop(init.client.clone(), init.context::<AwsAccessKeyRequest>()),
        run_watch_loop(init.client.clone(), init.context::<GcpAccessKeyRequest>()),
        run_watch_loop(
            init.client.clone(),
            init.context::<AzureAccessKeyRequest>()
        ),
    );

    init.server_state.set_ready(false);
    info!("Credential Request Controller stopped");
    result.map(|_| ())
}
