//! Hold manager error types.

use std::collections::HashMap;

use common::{HoldId, SeatId};
use serde::Serialize;
use store::{SeatStatus, StoreError};
use thiserror::Error;

/// Why a requested seat could not be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatConflictReason {
    /// The seat does not exist or belongs to a different event.
    NotFoundOrWrongEvent,
    /// The seat exists but is not AVAILABLE.
    NotAvailable,
    /// The seat read back as AVAILABLE after the write failed: a race
    /// between this attempt and a concurrent writer. Retrying usually
    /// succeeds.
    RaceConditionOrRetried,
}

/// Per-seat diagnostic attached to a reservation conflict, detailed enough
/// for the client to decide between "try different seats" and "retry".
#[derive(Debug, Clone, Serialize)]
pub struct SeatDiagnostic {
    pub reason: SeatConflictReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SeatStatus>,
}

/// Errors that can occur during hold operations.
#[derive(Debug, Error)]
pub enum HoldError {
    /// The requester is neither the attendee nor an administrator.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The request is missing or malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No hold exists with the given id.
    #[error("hold not found: {0}")]
    NotFound(HoldId),

    /// One or more requested seats could not transition AVAILABLE→HELD.
    /// No hold was created and no seat transition persists.
    #[error("one or more seats are not AVAILABLE")]
    SeatsUnavailable {
        diagnostics: HashMap<SeatId, SeatDiagnostic>,
    },

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for hold operations.
pub type Result<T> = std::result::Result<T, HoldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_reasons_serialize_as_snake_case() {
        let json = serde_json::to_string(&SeatConflictReason::NotFoundOrWrongEvent).unwrap();
        assert_eq!(json, "\"not_found_or_wrong_event\"");
        let json = serde_json::to_string(&SeatConflictReason::RaceConditionOrRetried).unwrap();
        assert_eq!(json, "\"race_condition_or_retried\"");
    }

    #[test]
    fn diagnostic_omits_absent_status() {
        let diag = SeatDiagnostic {
            reason: SeatConflictReason::NotFoundOrWrongEvent,
            status: None,
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert!(json.get("status").is_none());
    }
}
