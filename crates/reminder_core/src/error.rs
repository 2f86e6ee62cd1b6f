use thiserror::Error;

use crate::notifications::AuthorizationStatus;

/// Errors returned synchronously to callers of the core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReminderError {
    /// Notification permission has not been granted.
    #[error("notification authorization not granted ({status:?})")]
    AuthorizationDenied { status: AuthorizationStatus },
    /// The entry was rejected at the tracker boundary.
    #[error("invalid reminder entry `{identifier}`: {reason}")]
    InvalidEntry { identifier: String, reason: String },
    #[error("unknown notification category `{0}`")]
    UnknownCategory(String),
}

impl ReminderError {
    pub fn invalid_entry(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        ReminderError::InvalidEntry {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}

/// Queue operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOperation {
    Add,
    CancelPending,
    RemoveDelivered,
    ListPending,
    ListDelivered,
    Authorize,
}

/// Failure reported by a [`crate::notifications::NotificationCenter`]
/// adapter. These never propagate out of a reconciliation; they are logged
/// and collected for diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("notification {operation:?} failed: {message}")]
pub struct DeliveryError {
    pub operation: DeliveryOperation,
    pub message: String,
}

impl DeliveryError {
    pub fn new(operation: DeliveryOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}
