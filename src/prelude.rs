//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use credential_request_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (request kinds, `VaultRole`, status types)
//! - Credential manager traits and the Vault-backed implementations
//! - Reconciler types (`reconcile`, `Context`, `ReconcilerError`)
//! - Config types (`ControllerConfig`, `VaultConfig`)

pub use crate::crd::*;

pub use crate::credential::{
    Credential, CredentialError, CredentialManager, CredentialManagerFactory,
    VaultCredentialManager, VaultManagerFactory,
};

pub use crate::controller::reconciler::{reconcile, Context, ReconcilerError};

pub use crate::store::{KubeRequestStore, RequestStore, StoreError};

pub use crate::config::{ControllerConfig, VaultConfig};

pub use crate::vault::{VaultClient, VaultError};
