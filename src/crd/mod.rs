//! # Custom Resource Definitions
//!
//! CRD types for the Credential Request Controller.
//!
//! ## Module Structure
//!
//! - `requests.rs` - The four credential request kinds
//! - `spec.rs` - Spec types shared by every request kind and the `AccessRequest` trait
//! - `status.rs` - Status, conditions, lease and secret references
//! - `role.rs` - `VaultRole`, the backend role a request points at

mod requests;
mod role;
mod spec;
mod status;

pub use requests::{
    AwsAccessKeyRequest, AwsAccessKeyRequestSpec, AzureAccessKeyRequest,
    AzureAccessKeyRequestSpec, DatabaseAccessRequest, DatabaseAccessRequestSpec,
    GcpAccessKeyRequest, GcpAccessKeyRequestSpec,
};
pub use role::{EngineKind, GcpSecretType, VaultRole, VaultRoleSpec};
pub use spec::{AccessRequest, IssueParams, RequestKind, RoleRef, Subject};
pub use status::{
    AccessRequestStatus, Condition, Lease, RequestPhase, SecretReference, CONDITION_APPROVED,
    CONDITION_AVAILABLE, CONDITION_DENIED, CONDITION_FAILED, STATUS_FALSE, STATUS_TRUE,
};
