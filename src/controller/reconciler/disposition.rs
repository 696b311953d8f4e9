//! Approval disposition of a request, derived once per pass.

use crate::crd::{AccessRequestStatus, CONDITION_APPROVED, CONDITION_DENIED};
use thiserror::Error;

/// Where the external approver left the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Neither approved nor denied
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("request is both approved and denied")]
pub struct ConflictingDisposition;

impl Disposition {
    /// Derive the disposition from the approval conditions
    ///
    /// # Errors
    ///
    /// Returns [`ConflictingDisposition`] when both `Approved` and `Denied` are true.
    pub fn from_status(status: &AccessRequestStatus) -> Result<Self, ConflictingDisposition> {
        match (
            status.is_condition_true(CONDITION_APPROVED),
            status.is_condition_true(CONDITION_DENIED),
        ) {
            (true, true) => Err(ConflictingDisposition),
            (true, false) => Ok(Self::Approved),
            (false, true) => Ok(Self::Denied),
            (false, false) => Ok(Self::Pending),
        }
    }
}
