//! # Access Request Status
//!
//! Status types shared by every credential request kind.
//!
//! All `Option` fields serialize as `null` when empty. Status writes are JSON
//! merge patches, so a `null` removes the field from the stored object. This
//! is how `lease` and `secret` are cleared after compensation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set by the approver when a request is approved
pub const CONDITION_APPROVED: &str = "Approved";
/// Condition type set by the approver when a request is denied
pub const CONDITION_DENIED: &str = "Denied";
/// Condition type recording the last issuance failure
pub const CONDITION_FAILED: &str = "Failed";
/// Condition type recording that credentials were issued and wired up
pub const CONDITION_AVAILABLE: &str = "Available";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/// Lifecycle phase of a credential request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RequestPhase {
    WaitingForApproval,
    Approved,
    Denied,
    Available,
    Failed,
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WaitingForApproval => "WaitingForApproval",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Available => "Available",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Status of a credential request
///
/// Owned by the controller except for the `Approved`/`Denied` conditions,
/// which are written by the external approver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestStatus {
    /// Current phase of the request
    #[serde(default)]
    pub phase: Option<RequestPhase>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Backend lease of the issued credential, present while it is believed live
    #[serde(default)]
    pub lease: Option<Lease>,
    /// Secret holding the issued credential, present until it is deleted
    #[serde(default)]
    pub secret: Option<SecretReference>,
    /// Last spec generation fully processed by the controller
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Backend lease metadata for an issued credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Lease identifier used for revocation (may be empty for lease-less credentials)
    pub id: String,
    /// Lease duration, e.g. "3600s"
    pub duration: String,
    /// Whether the backend allows renewing the lease
    #[serde(default)]
    pub renewable: bool,
}

impl Lease {
    #[must_use]
    pub fn new(id: impl Into<String>, duration_seconds: u64, renewable: bool) -> Self {
        Self {
            id: id.into(),
            duration: format!("{duration_seconds}s"),
            renewable,
        }
    }
}

/// Reference to a secret in the request's namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretReference {
    pub name: String,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    #[must_use]
    pub fn new(r#type: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            r#type: r#type.to_string(),
            status: if status { STATUS_TRUE } else { STATUS_FALSE }.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == STATUS_TRUE
    }
}

impl AccessRequestStatus {
    #[must_use]
    pub fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    #[must_use]
    pub fn has_condition(&self, r#type: &str) -> bool {
        self.condition(r#type).is_some()
    }

    #[must_use]
    pub fn is_condition_true(&self, r#type: &str) -> bool {
        self.condition(r#type).is_some_and(Condition::is_true)
    }

    /// Insert or replace the condition with the same type.
    ///
    /// `lastTransitionTime` only moves when the condition's status flips, so
    /// re-recording an identical condition leaves the status unchanged.
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) => {
                if existing.status != condition.status {
                    existing.last_transition_time = condition.last_transition_time;
                    existing.status = condition.status;
                }
                existing.reason = condition.reason;
                existing.message = condition.message;
            }
            None => self.conditions.push(condition),
        }
    }

    pub fn remove_condition(&mut self, r#type: &str) {
        self.conditions.retain(|c| c.r#type != r#type);
    }

    /// Phase implied by the current conditions.
    #[must_use]
    pub fn derived_phase(&self) -> RequestPhase {
        if self.is_condition_true(CONDITION_DENIED) {
            RequestPhase::Denied
        } else if self.is_condition_true(CONDITION_FAILED) {
            RequestPhase::Failed
        } else if self.is_condition_true(CONDITION_AVAILABLE) {
            RequestPhase::Available
        } else if self.is_condition_true(CONDITION_APPROVED) {
            RequestPhase::Approved
        } else {
            RequestPhase::WaitingForApproval
        }
    }

    /// Whether credentials were issued and no failure has been recorded since.
    ///
    /// Re-delivery of a request in this state must not issue again.
    #[must_use]
    pub fn is_successfully_processed(&self) -> bool {
        self.secret.is_some() && !self.has_condition(CONDITION_FAILED)
    }
}
