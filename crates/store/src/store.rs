//! Store traits.
//!
//! Each trait method is one unit of work: either a single atomic statement
//! (the conditional transitions) or a multi-statement transaction that
//! commits or rolls back as a whole. Several independent service processes
//! share the same schema, so correctness is a property of these boundaries,
//! not of any in-process coordination.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, HoldId, Money, OrderId, SeatId};

use crate::error::Result;
use crate::records::{
    AttemptKind, AttemptStatus, Hold, HoldStatus, IdempotencyRecord, NewHold, NewOrder, Order,
    OrderState, PaymentAttempt, Seat, SeatStatus,
};

/// Outcome of an atomic hold creation.
#[derive(Debug, Clone)]
pub enum HoldCreation {
    /// All requested seats transitioned AVAILABLE→HELD and the hold row was
    /// inserted as ACTIVE.
    Created(Hold),
    /// At least one seat could not transition; nothing was persisted.
    /// `statuses` contains the observed status of every requested seat that
    /// exists under the event — missing entries are unknown or belong to a
    /// different event.
    Unavailable {
        statuses: HashMap<SeatId, SeatStatus>,
    },
}

/// Seat ledger and hold persistence.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Inserts or replaces a seat row. Seeding only; the ledger's status
    /// field is otherwise mutated exclusively through [`transition_seats`]
    /// and the composite hold operations.
    ///
    /// [`transition_seats`]: InventoryStore::transition_seats
    async fn put_seat(&self, seat: Seat) -> Result<()>;

    /// Loads one seat row.
    async fn get_seat(&self, event_id: EventId, seat_id: SeatId) -> Result<Option<Seat>>;

    /// The conditional update primitive: transitions every listed seat of
    /// the event whose current status equals `from` to `to`, and returns how
    /// many rows actually changed.
    ///
    /// The predicate and the write are a single atomic statement. Callers
    /// must compare the returned count with the expected count and treat a
    /// mismatch as a concurrency conflict.
    async fn transition_seats(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64>;

    /// Returns the observed status of each requested seat that exists under
    /// the event. Requested ids absent from the result are unknown or belong
    /// to a different event.
    async fn seat_statuses(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> Result<HashMap<SeatId, SeatStatus>>;

    /// Returns prices for the requested seats, restricted to seats whose
    /// current status is HELD. A short result means another actor already
    /// moved a seat out of HELD.
    async fn held_seat_prices(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> Result<HashMap<SeatId, Money>>;

    /// Atomically transitions the requested seats AVAILABLE→HELD and inserts
    /// the ACTIVE hold row. All-or-nothing: if any seat cannot transition,
    /// nothing persists and the observed seat statuses are returned for
    /// diagnostics.
    async fn create_hold(&self, hold: NewHold) -> Result<HoldCreation>;

    /// Loads one hold.
    async fn get_hold(&self, id: HoldId) -> Result<Option<Hold>>;

    /// Closes a hold in one transaction: unconditionally attempts
    /// HELD→AVAILABLE on the hold's seats, then sets the hold to `outcome`
    /// only if it is still ACTIVE. `outcome` must be EXPIRED or RELEASED.
    /// Closing a non-ACTIVE hold is a no-op, not an error.
    async fn close_hold(&self, hold: &Hold, outcome: HoldStatus) -> Result<()>;

    /// Returns every ACTIVE hold whose expiry instant is before `now`.
    async fn find_expired_active_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>>;
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a PENDING order with the captured amount.
    async fn insert_pending(&self, order: NewOrder) -> Result<Order>;

    /// Loads one order.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Finalizes a sale in one transaction: transitions the listed seats
    /// HELD→SOLD and, only if every seat transitioned, sets the order to
    /// CONFIRMED. On a short count the transaction rolls back and nothing
    /// persists. Returns the number of seats that transitioned.
    async fn finalize_order(
        &self,
        id: OrderId,
        event_id: EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Sets an order's state. Transition legality is the caller's concern.
    async fn set_state(
        &self,
        id: OrderId,
        state: OrderState,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>>;
}

/// Append-only payment attempt audit trail.
#[async_trait]
pub trait PaymentLog: Send + Sync {
    /// Records one payment attempt.
    async fn record_attempt(
        &self,
        order_id: OrderId,
        kind: AttemptKind,
        status: AttemptStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PaymentAttempt>;

    /// Returns all attempts for an order, oldest first.
    async fn attempts_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>>;
}

/// Idempotency key persistence.
///
/// The key's primary-key uniqueness constraint is the serialization point:
/// there is no check-then-insert race.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Attempts to insert a new record for the key. Returns false if the key
    /// already exists.
    async fn try_insert(&self, key: &str, request_hash: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Caches the command's response for replays.
    async fn store_response(
        &self,
        key: &str,
        order_id: Option<OrderId>,
        response_json: &str,
    ) -> Result<()>;

    /// Loads the record for a key.
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>>;

    /// Removes a key record. Abort compensation for a command that failed
    /// before caching any response, so a corrected retry under the same key
    /// is not reported as in flight.
    async fn discard(&self, key: &str) -> Result<()>;
}

/// A store implementing every persistence concern of the system.
pub trait TicketStore: InventoryStore + OrderStore + PaymentLog + IdempotencyStore {}

impl<T> TicketStore for T where T: InventoryStore + OrderStore + PaymentLog + IdempotencyStore {}
