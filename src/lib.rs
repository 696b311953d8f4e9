//! Credential Request Controller Library
//!
//! Issues time-bounded Vault credentials for approved access requests, wires
//! them to the requesting subjects through a Role and RoleBinding, and revokes
//! the lease when the request is deleted.
//!
//! ## Quick Start
//!
//! ```rust
//! use credential_request_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod credential;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
pub mod vault;
