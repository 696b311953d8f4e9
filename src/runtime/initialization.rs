//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and the Kubernetes and Vault clients.

use crate::config::{ControllerConfig, VaultConfig};
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::Context;
use crate::controller::server::{start_server, ServerState};
use crate::credential::VaultManagerFactory;
use crate::crd::AccessRequest;
use crate::observability;
use crate::store::KubeRequestStore;
use crate::vault::VaultClient;
use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the watch loops need, shared by every request kind
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Controller configuration loaded from the environment
    pub controller_config: ControllerConfig,
    /// Vault client, `None` when `VAULT_ADDR` is not set
    pub vault: Option<Arc<VaultClient>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("controller_config", &self.controller_config)
            .field("vault", &self.vault)
            .finish_non_exhaustive()
    }
}

impl InitializationResult {
    /// Reconciler context for one request kind
    #[must_use]
    pub fn context<K: AccessRequest>(&self) -> Arc<Context<K>> {
        let field_manager = self.controller_config.field_manager.clone();
        let store = Arc::new(KubeRequestStore::new(
            self.client.clone(),
            field_manager.clone(),
        ));
        let managers = Arc::new(VaultManagerFactory::new(
            self.client.clone(),
            self.vault.clone(),
            field_manager,
        ));
        Arc::new(Context::new(
            store,
            managers,
            self.controller_config.clone(),
        ))
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Vault client creation
///
/// # Errors
///
/// Returns an error if metrics cannot be registered, the HTTP server does not
/// come up, or a client cannot be built.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything touches rustls
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    let controller_config = ControllerConfig::from_env();
    init_tracing(&controller_config);

    info!("Starting Credential Request Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = controller_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let vault = match VaultConfig::from_env() {
        Some(config) => {
            let vault = VaultClient::new(config).context("Failed to create Vault client")?;
            info!(address = %vault.address(), "Vault backend configured");
            Some(Arc::new(vault))
        }
        None => {
            warn!("VAULT_ADDR is not set, approved requests will fail until a backend is configured");
            None
        }
    };

    info!(
        workers = controller_config.num_workers,
        max_num_requeues = controller_config.max_num_requeues,
        namespace = %controller_config.controller_namespace,
        "Controller initialized, starting watch loops..."
    );

    Ok(InitializationResult {
        client,
        server_state,
        controller_config,
        vault,
    })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `LOG_LEVEL` when set.
fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "credential_request_controller={}",
            config.log_level.to_lowercase()
        )
        .into()
    });

    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
