//! Settlement error types.

use common::{HoldId, OrderId};
use store::{HoldStatus, OrderState, StoreError};
use thiserror::Error;

/// Errors that can occur during order settlement.
///
/// `PaymentDeclined` and `PaymentTimeout` are designed business outcomes,
/// not failures: the order stays PENDING, the seats stay HELD, and the
/// response was cached for replays before the error surfaced.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The requester is neither the attendee nor an administrator.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The request is missing or malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The referenced hold does not exist.
    #[error("hold not found: {0}")]
    HoldNotFound(HoldId),

    /// The referenced hold is no longer ACTIVE.
    #[error("hold is not ACTIVE (status {status})")]
    HoldNotActive { status: HoldStatus },

    /// The hold belongs to a different attendee or event.
    #[error("hold does not belong to attendee or event")]
    HoldOwnershipMismatch,

    /// The requested seat set is not exactly the hold's seat set.
    #[error("requested seats do not match hold")]
    SeatSetMismatch,

    /// Another actor already moved a requested seat out of HELD.
    #[error("one or more seats are not HELD")]
    SeatsNotHeld,

    /// The HELD→SOLD transition raced with another writer between pricing
    /// and finalization. Nothing was committed.
    #[error("could not mark all seats as SOLD")]
    SoldTransitionRace,

    /// The idempotency key was reused with a different payload.
    #[error("idempotency key re-used with different payload")]
    KeyReuse,

    /// A concurrent request with the same key has not finished yet.
    #[error("request with same idempotency key is in flight")]
    RequestInFlight,

    /// Simulated authorization decline. The order stays PENDING.
    #[error("payment declined (mock)")]
    PaymentDeclined { order_id: OrderId },

    /// Simulated gateway timeout. The order stays PENDING.
    #[error("payment timeout (mock)")]
    PaymentTimeout { order_id: OrderId },

    /// No order exists with the given id.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// The administrative state transition is not legal.
    #[error("invalid order state transition {from} -> {to}")]
    InvalidTransition { from: OrderState, to: OrderState },

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Response (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SettlementError {
    /// Machine-readable reason for conflict responses, so a client can
    /// distinguish "try different seats" from "retry the same request".
    pub fn conflict_reason(&self) -> Option<&'static str> {
        match self {
            SettlementError::HoldNotActive { .. } => Some("hold_not_active"),
            SettlementError::SeatSetMismatch => Some("seat_set_mismatch"),
            SettlementError::SeatsNotHeld => Some("seats_not_held"),
            SettlementError::SoldTransitionRace => Some("sold_transition_race"),
            SettlementError::KeyReuse => Some("idempotency_key_reuse"),
            SettlementError::RequestInFlight => Some("request_in_flight"),
            SettlementError::InvalidTransition { .. } => Some("invalid_state_transition"),
            _ => None,
        }
    }
}

/// Result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;
