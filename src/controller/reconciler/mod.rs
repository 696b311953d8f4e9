//! # Reconciler
//!
//! The credential request state machine.
//!
//! One generic implementation serves every request kind; the kind only
//! selects the CRD type and, through the credential manager factory, the
//! backend engine.
//!
//! ## Module Structure
//!
//! - `reconcile.rs` - Pass entry point, deletion check, finalizer bootstrap, approval gate
//! - `issue.rs` - Issuance sequence and compensation
//! - `finalize.rs` - Lease revocation on deletion
//! - `disposition.rs` - Approval disposition derived from conditions
//! - `status.rs` - Status writes with phase refresh
//! - `types.rs` - Context and errors

mod disposition;
mod finalize;
mod issue;
mod reconcile;
mod status;
mod types;

#[cfg(test)]
mod tests;

pub use disposition::{ConflictingDisposition, Disposition};
pub use reconcile::reconcile;
pub use types::{reason, Context, ReconcilerError};
