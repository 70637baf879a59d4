//! Domain records and their status state machines.

use chrono::{DateTime, Utc};
use common::{AttemptId, AttendeeId, Currency, EventId, HoldId, Money, OrderId, SeatId};
use serde::{Deserialize, Serialize};

/// The state of a seat in the ledger.
///
/// Transitions:
/// ```text
/// AVAILABLE ──► HELD ──► SOLD
///      ▲          │
///      └──────────┘  (release / expiry)
/// ```
/// SOLD is terminal. Seats move only via the conditional update primitive,
/// never through a plain write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Held,
    Sold,
}

impl SeatStatus {
    /// Returns the status name as stored in the schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Sold => "SOLD",
        }
    }

    /// Parses a schema status value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(SeatStatus::Available),
            "HELD" => Some(SeatStatus::Held),
            "SOLD" => Some(SeatStatus::Sold),
            _ => None,
        }
    }
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A seat row in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub event_id: EventId,
    pub price: Money,
    pub currency: Currency,
    pub status: SeatStatus,
}

/// The state of a hold.
///
/// ACTIVE is the only non-terminal state. EXPIRED (system-initiated) and
/// RELEASED (attendee-initiated) are terminal and mutually exclusive; the
/// distinction is kept for audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Active,
    Expired,
    Released,
}

impl HoldStatus {
    /// Returns the status name as stored in the schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Active => "ACTIVE",
            HoldStatus::Expired => "EXPIRED",
            HoldStatus::Released => "RELEASED",
        }
    }

    /// Parses a schema status value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(HoldStatus::Active),
            "EXPIRED" => Some(HoldStatus::Expired),
            "RELEASED" => Some(HoldStatus::Released),
            _ => None,
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Active)
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A time-bounded reservation of specific seats for one attendee.
///
/// The seat set is immutable after creation. Holds are closed logically,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: HoldStatus,
}

/// Input for creating a hold together with its seats' AVAILABLE→HELD
/// transition.
#[derive(Debug, Clone)]
pub struct NewHold {
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The state of an order.
///
/// State transitions:
/// ```text
/// PENDING ──► CONFIRMED ──► CHECKED_IN ──► COMPLETED
///    │            │
///    └────────────┴──► CANCELLED
/// ```
/// PENDING→CONFIRMED happens only inside the settlement saga, after the
/// order's seats complete HELD→SOLD. The remaining edges are administrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Pending,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
}

impl OrderState {
    /// Returns the state name as stored in the schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "PENDING",
            OrderState::Confirmed => "CONFIRMED",
            OrderState::CheckedIn => "CHECKED_IN",
            OrderState::Completed => "COMPLETED",
            OrderState::Cancelled => "CANCELLED",
        }
    }

    /// Parses a schema state value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderState::Pending),
            "CONFIRMED" => Some(OrderState::Confirmed),
            "CHECKED_IN" => Some(OrderState::CheckedIn),
            "COMPLETED" => Some(OrderState::Completed),
            "CANCELLED" => Some(OrderState::Cancelled),
            _ => None,
        }
    }

    /// Returns true if the administrative transition to `target` is legal.
    ///
    /// PENDING→CONFIRMED is deliberately absent: confirmation is reachable
    /// only through settlement.
    pub fn can_transition_to(self, target: OrderState) -> bool {
        matches!(
            (self, target),
            (OrderState::Pending, OrderState::Cancelled)
                | (OrderState::Confirmed, OrderState::CheckedIn)
                | (OrderState::Confirmed, OrderState::Cancelled)
                | (OrderState::CheckedIn, OrderState::Completed)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Cancelled)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A settled or in-flight purchase of seats.
///
/// The amount is captured once at settlement time and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Money,
    pub currency: Currency,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a PENDING order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Money,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// The outward order view for downstream consumers (e.g. review
/// eligibility checks). Reflects only committed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub state: OrderState,
}

/// The kind of payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptKind {
    Authorize,
    Capture,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptKind::Authorize => "AUTHORIZE",
            AttemptKind::Capture => "CAPTURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTHORIZE" => Some(AttemptKind::Authorize),
            "CAPTURE" => Some(AttemptKind::Capture),
            _ => None,
        }
    }
}

/// The outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Success,
    Declined,
    Timeout,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "SUCCESS",
            AttemptStatus::Declined => "DECLINED",
            AttemptStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(AttemptStatus::Success),
            "DECLINED" => Some(AttemptStatus::Declined),
            "TIMEOUT" => Some(AttemptStatus::Timeout),
            _ => None,
        }
    }
}

/// One entry in the append-only payment audit trail. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: AttemptId,
    pub order_id: OrderId,
    pub kind: AttemptKind,
    pub status: AttemptStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A client-supplied idempotency key with its request fingerprint and,
/// once the command finished, the cached response.
///
/// The fingerprint is immutable once set: a second request under the same
/// key with a different fingerprint is a hard conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub request_hash: String,
    pub response_json: Option<String>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_status_roundtrips_through_schema_value() {
        for status in [SeatStatus::Available, SeatStatus::Held, SeatStatus::Sold] {
            assert_eq!(SeatStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SeatStatus::parse("BROKEN"), None);
    }

    #[test]
    fn seat_status_serializes_as_schema_value() {
        let json = serde_json::to_string(&SeatStatus::Available).unwrap();
        assert_eq!(json, "\"AVAILABLE\"");
    }

    #[test]
    fn hold_terminal_states() {
        assert!(!HoldStatus::Active.is_terminal());
        assert!(HoldStatus::Expired.is_terminal());
        assert!(HoldStatus::Released.is_terminal());
    }

    #[test]
    fn order_state_checked_in_serializes_with_underscore() {
        let json = serde_json::to_string(&OrderState::CheckedIn).unwrap();
        assert_eq!(json, "\"CHECKED_IN\"");
        assert_eq!(OrderState::parse("CHECKED_IN"), Some(OrderState::CheckedIn));
    }

    #[test]
    fn administrative_transitions() {
        assert!(OrderState::Pending.can_transition_to(OrderState::Cancelled));
        assert!(OrderState::Confirmed.can_transition_to(OrderState::CheckedIn));
        assert!(OrderState::Confirmed.can_transition_to(OrderState::Cancelled));
        assert!(OrderState::CheckedIn.can_transition_to(OrderState::Completed));

        // Confirmation is settlement-only.
        assert!(!OrderState::Pending.can_transition_to(OrderState::Confirmed));
        assert!(!OrderState::Cancelled.can_transition_to(OrderState::Pending));
        assert!(!OrderState::Completed.can_transition_to(OrderState::Cancelled));
    }

    #[test]
    fn order_terminal_states() {
        assert!(OrderState::Completed.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(!OrderState::Pending.is_terminal());
        assert!(!OrderState::Confirmed.is_terminal());
        assert!(!OrderState::CheckedIn.is_terminal());
    }
}
