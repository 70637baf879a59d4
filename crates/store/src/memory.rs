//! In-memory store implementation for tests and local runs.
//!
//! A single write lock per operation gives the same atomicity the
//! PostgreSQL implementation gets from transactions and conditional
//! updates, so both implementations are interchangeable in tests.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, EventId, HoldId, Money, OrderId, SeatId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::records::{
    AttemptKind, AttemptStatus, Hold, HoldStatus, IdempotencyRecord, NewHold, NewOrder, Order,
    OrderState, PaymentAttempt, Seat, SeatStatus,
};
use crate::store::{HoldCreation, IdempotencyStore, InventoryStore, OrderStore, PaymentLog};

#[derive(Default)]
struct MemoryState {
    seats: HashMap<(EventId, SeatId), Seat>,
    holds: HashMap<HoldId, Hold>,
    orders: HashMap<OrderId, Order>,
    attempts: Vec<PaymentAttempt>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

impl MemoryState {
    fn transition_seats(
        &mut self,
        event_id: EventId,
        seat_ids: &[SeatId],
        from: SeatStatus,
        to: SeatStatus,
    ) -> u64 {
        let mut changed = 0;
        for seat_id in seat_ids {
            if let Some(seat) = self.seats.get_mut(&(event_id, *seat_id))
                && seat.status == from
            {
                seat.status = to;
                changed += 1;
            }
        }
        changed
    }

    fn seat_statuses(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> HashMap<SeatId, SeatStatus> {
        seat_ids
            .iter()
            .filter_map(|seat_id| {
                self.seats
                    .get(&(event_id, *seat_id))
                    .map(|seat| (*seat_id, seat.status))
            })
            .collect()
    }
}

/// In-memory store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of payment attempts recorded so far.
    pub async fn attempt_count(&self) -> usize {
        self.state.read().await.attempts.len()
    }

    /// Returns the number of order rows.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn put_seat(&self, seat: Seat) -> Result<()> {
        let mut state = self.state.write().await;
        state.seats.insert((seat.event_id, seat.id), seat);
        Ok(())
    }

    async fn get_seat(&self, event_id: EventId, seat_id: SeatId) -> Result<Option<Seat>> {
        let state = self.state.read().await;
        Ok(state.seats.get(&(event_id, seat_id)).cloned())
    }

    async fn transition_seats(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(state.transition_seats(event_id, seat_ids, from, to))
    }

    async fn seat_statuses(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> Result<HashMap<SeatId, SeatStatus>> {
        let state = self.state.read().await;
        Ok(state.seat_statuses(event_id, seat_ids))
    }

    async fn held_seat_prices(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> Result<HashMap<SeatId, Money>> {
        let state = self.state.read().await;
        Ok(seat_ids
            .iter()
            .filter_map(|seat_id| {
                state
                    .seats
                    .get(&(event_id, *seat_id))
                    .filter(|seat| seat.status == SeatStatus::Held)
                    .map(|seat| (*seat_id, seat.price))
            })
            .collect())
    }

    async fn create_hold(&self, hold: NewHold) -> Result<HoldCreation> {
        let mut state = self.state.write().await;

        // All-or-nothing: nothing is written unless every seat is AVAILABLE.
        let all_available = hold.seat_ids.iter().all(|seat_id| {
            state
                .seats
                .get(&(hold.event_id, *seat_id))
                .is_some_and(|seat| seat.status == SeatStatus::Available)
        });

        if !all_available {
            let statuses = state.seat_statuses(hold.event_id, &hold.seat_ids);
            return Ok(HoldCreation::Unavailable { statuses });
        }

        state.transition_seats(
            hold.event_id,
            &hold.seat_ids,
            SeatStatus::Available,
            SeatStatus::Held,
        );

        let record = Hold {
            id: HoldId::new(),
            attendee_id: hold.attendee_id,
            event_id: hold.event_id,
            seat_ids: hold.seat_ids,
            created_at: hold.created_at,
            expires_at: hold.expires_at,
            status: HoldStatus::Active,
        };
        state.holds.insert(record.id, record.clone());
        Ok(HoldCreation::Created(record))
    }

    async fn get_hold(&self, id: HoldId) -> Result<Option<Hold>> {
        let state = self.state.read().await;
        Ok(state.holds.get(&id).cloned())
    }

    async fn close_hold(&self, hold: &Hold, outcome: HoldStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.transition_seats(
            hold.event_id,
            &hold.seat_ids,
            SeatStatus::Held,
            SeatStatus::Available,
        );
        if let Some(stored) = state.holds.get_mut(&hold.id)
            && stored.status == HoldStatus::Active
        {
            stored.status = outcome;
        }
        Ok(())
    }

    async fn find_expired_active_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let state = self.state.read().await;
        Ok(state
            .holds
            .values()
            .filter(|hold| hold.status == HoldStatus::Active && hold.expires_at < now)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_pending(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;
        let record = Order {
            id: OrderId::new(),
            attendee_id: order.attendee_id,
            event_id: order.event_id,
            seat_ids: order.seat_ids,
            amount: order.amount,
            currency: order.currency,
            state: OrderState::Pending,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        state.orders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).cloned())
    }

    async fn finalize_order(
        &self,
        id: OrderId,
        event_id: EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;

        // Mirror the transactional rollback: check first, write only if the
        // full set would transition.
        let transitionable = seat_ids
            .iter()
            .filter(|seat_id| {
                state
                    .seats
                    .get(&(event_id, **seat_id))
                    .is_some_and(|seat| seat.status == SeatStatus::Held)
            })
            .count() as u64;

        if transitionable != seat_ids.len() as u64 {
            return Ok(transitionable);
        }

        let sold = state.transition_seats(event_id, seat_ids, SeatStatus::Held, SeatStatus::Sold);
        if let Some(order) = state.orders.get_mut(&id) {
            order.state = OrderState::Confirmed;
            order.updated_at = now;
        }
        Ok(sold)
    }

    async fn set_state(
        &self,
        id: OrderId,
        new_state: OrderState,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        Ok(state.orders.get_mut(&id).map(|order| {
            order.state = new_state;
            order.updated_at = now;
            order.clone()
        }))
    }
}

#[async_trait]
impl PaymentLog for InMemoryStore {
    async fn record_attempt(
        &self,
        order_id: OrderId,
        kind: AttemptKind,
        status: AttemptStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PaymentAttempt> {
        let mut state = self.state.write().await;
        let attempt = PaymentAttempt {
            id: AttemptId::new(),
            order_id,
            kind,
            status,
            reason: reason.map(String::from),
            created_at: now,
        };
        state.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn attempts_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|attempt| attempt.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn try_insert(&self, key: &str, request_hash: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.idempotency.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(IdempotencyRecord {
                    key: key.to_string(),
                    request_hash: request_hash.to_string(),
                    response_json: None,
                    order_id: None,
                    created_at: now,
                });
                Ok(true)
            }
        }
    }

    async fn store_response(
        &self,
        key: &str,
        order_id: Option<OrderId>,
        response_json: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(record) = state.idempotency.get_mut(key) {
            record.order_id = order_id;
            record.response_json = Some(response_json.to_string());
        }
        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let state = self.state.read().await;
        Ok(state.idempotency.get(key).cloned())
    }

    async fn discard(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.idempotency.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{AttendeeId, Currency};

    use super::*;

    fn seat(event_id: EventId, status: SeatStatus) -> Seat {
        Seat {
            id: SeatId::new(),
            event_id,
            price: Money::from_cents(2500),
            currency: Currency::new("USD"),
            status,
        }
    }

    async fn seed_seats(store: &InMemoryStore, event_id: EventId, n: usize) -> Vec<SeatId> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            let s = seat(event_id, SeatStatus::Available);
            ids.push(s.id);
            store.put_seat(s).await.unwrap();
        }
        ids
    }

    fn new_hold(event_id: EventId, seat_ids: Vec<SeatId>) -> NewHold {
        let now = Utc::now();
        NewHold {
            attendee_id: AttendeeId::new(),
            event_id,
            seat_ids,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn transition_counts_only_matching_rows() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let ids = seed_seats(&store, event_id, 3).await;

        // Move one seat out of AVAILABLE first.
        let moved = store
            .transition_seats(event_id, &ids[..1], SeatStatus::Available, SeatStatus::Held)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let moved = store
            .transition_seats(event_id, &ids, SeatStatus::Available, SeatStatus::Held)
            .await
            .unwrap();
        assert_eq!(moved, 2);
    }

    #[tokio::test]
    async fn transition_ignores_other_events() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let ids = seed_seats(&store, event_id, 1).await;

        let moved = store
            .transition_seats(
                EventId::new(),
                &ids,
                SeatStatus::Available,
                SeatStatus::Held,
            )
            .await
            .unwrap();
        assert_eq!(moved, 0);
    }

    #[tokio::test]
    async fn create_hold_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let mut ids = seed_seats(&store, event_id, 2).await;
        let sold = seat(event_id, SeatStatus::Sold);
        ids.push(sold.id);
        store.put_seat(sold).await.unwrap();

        let outcome = store
            .create_hold(new_hold(event_id, ids.clone()))
            .await
            .unwrap();
        let HoldCreation::Unavailable { statuses } = outcome else {
            panic!("expected unavailable outcome");
        };
        assert_eq!(statuses.len(), 3);

        // The two AVAILABLE seats must not have been touched.
        for seat_id in &ids[..2] {
            let seat = store.get_seat(event_id, *seat_id).await.unwrap().unwrap();
            assert_eq!(seat.status, SeatStatus::Available);
        }
    }

    #[tokio::test]
    async fn create_hold_reports_missing_seats() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let mut ids = seed_seats(&store, event_id, 1).await;
        ids.push(SeatId::new()); // never seeded

        let outcome = store.create_hold(new_hold(event_id, ids)).await.unwrap();
        let HoldCreation::Unavailable { statuses } = outcome else {
            panic!("expected unavailable outcome");
        };
        assert_eq!(statuses.len(), 1);
    }

    #[tokio::test]
    async fn close_hold_is_idempotent_on_status() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let ids = seed_seats(&store, event_id, 2).await;

        let HoldCreation::Created(hold) = store
            .create_hold(new_hold(event_id, ids.clone()))
            .await
            .unwrap()
        else {
            panic!("expected created outcome");
        };

        store
            .close_hold(&hold, HoldStatus::Released)
            .await
            .unwrap();
        let stored = store.get_hold(hold.id).await.unwrap().unwrap();
        assert_eq!(stored.status, HoldStatus::Released);

        // Second close does not overwrite the terminal status.
        store.close_hold(&hold, HoldStatus::Expired).await.unwrap();
        let stored = store.get_hold(hold.id).await.unwrap().unwrap();
        assert_eq!(stored.status, HoldStatus::Released);
    }

    #[tokio::test]
    async fn finalize_order_rolls_back_on_short_count() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let ids = seed_seats(&store, event_id, 2).await;

        // Only hold the first seat; the second remains AVAILABLE.
        store
            .transition_seats(event_id, &ids[..1], SeatStatus::Available, SeatStatus::Held)
            .await
            .unwrap();

        let order = store
            .insert_pending(NewOrder {
                attendee_id: AttendeeId::new(),
                event_id,
                seat_ids: ids.clone(),
                amount: Money::from_cents(5000),
                currency: Currency::new("USD"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let sold = store
            .finalize_order(order.id, event_id, &ids, Utc::now())
            .await
            .unwrap();
        assert_eq!(sold, 1);

        // Nothing was committed: the held seat is still HELD, order PENDING.
        let seat = store.get_seat(event_id, ids[0]).await.unwrap().unwrap();
        assert_eq!(seat.status, SeatStatus::Held);
        let order = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.state, OrderState::Pending);
    }

    #[tokio::test]
    async fn try_insert_serializes_on_key() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        assert!(store.try_insert("k-1", "hash-a", now).await.unwrap());
        assert!(!store.try_insert("k-1", "hash-b", now).await.unwrap());

        // The original fingerprint is untouched.
        let record = store.find("k-1").await.unwrap().unwrap();
        assert_eq!(record.request_hash, "hash-a");
        assert!(record.response_json.is_none());
    }

    #[tokio::test]
    async fn discard_frees_the_key() {
        let store = InMemoryStore::new();
        store.try_insert("k-3", "hash", Utc::now()).await.unwrap();
        store.discard("k-3").await.unwrap();
        assert!(store.find("k-3").await.unwrap().is_none());
        assert!(store.try_insert("k-3", "hash", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn store_response_round_trips() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        store.try_insert("k-2", "hash", Utc::now()).await.unwrap();
        store
            .store_response("k-2", Some(order_id), "{\"ok\":true}")
            .await
            .unwrap();

        let record = store.find("k-2").await.unwrap().unwrap();
        assert_eq!(record.order_id, Some(order_id));
        assert_eq!(record.response_json.as_deref(), Some("{\"ok\":true}"));
    }
}
