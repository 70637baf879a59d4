//! Order settlement saga.
//!
//! Steps, in order, each a precondition for the next: authorization,
//! idempotency registration, hold validation, seat-set validation, pricing,
//! PENDING order insert, simulated payment, finalization. Every early exit
//! happens before any mutation; the only retained non-success state is the
//! deliberate PENDING order after a simulated decline or timeout.

use chrono::{DateTime, Utc};
use common::{AttendeeId, AuthContext, Clock, Currency, EventId, HoldId, Money, OrderId, SeatId};
use serde::{Deserialize, Serialize};
use store::{
    AttemptKind, AttemptStatus, HoldStatus, NewOrder, Order, OrderState, OrderView, TicketStore,
};

use crate::error::{Result, SettlementError};
use crate::fingerprint::{normalize_simulation, order_fingerprint};

/// A settlement request as received from the client.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub currency: Currency,
    pub hold_id: HoldId,
    /// Payment simulation flag: `decline`, `timeout`, or anything else for
    /// success. Case and surrounding whitespace are ignored.
    pub simulate: Option<String>,
}

/// The settlement response. This exact payload is cached under the
/// idempotency key, so replays are byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub id: OrderId,
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Money,
    pub currency: Currency,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

impl OrderReceipt {
    fn from_order(order: &Order, state: OrderState) -> Self {
        Self {
            id: order.id,
            attendee_id: order.attendee_id,
            event_id: order.event_id,
            seat_ids: order.seat_ids.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            state,
            created_at: order.created_at,
        }
    }
}

/// Parsed payment simulation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSimulation {
    Approve,
    Decline,
    Timeout,
}

impl PaymentSimulation {
    /// Parses the request flag. Unknown values approve, matching the mock
    /// gateway's permissive behavior.
    pub fn from_request(raw: Option<&str>) -> Self {
        match normalize_simulation(raw).as_str() {
            "decline" => PaymentSimulation::Decline,
            "timeout" => PaymentSimulation::Timeout,
            _ => PaymentSimulation::Approve,
        }
    }
}

/// Drives the settlement saga and the order read paths.
pub struct SettlementService<S, C> {
    store: S,
    clock: C,
}

impl<S, C> SettlementService<S, C>
where
    S: TicketStore,
    C: Clock,
{
    /// Creates a new settlement service.
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Settles an order against an ACTIVE hold, idempotently.
    ///
    /// A replay under the same key and payload returns the cached response
    /// without re-executing any step; the same key with a different payload
    /// fails with a reuse conflict.
    #[tracing::instrument(
        skip(self, req, ctx),
        fields(attendee_id = %req.attendee_id, hold_id = %req.hold_id)
    )]
    pub async fn create_order(
        &self,
        idempotency_key: &str,
        req: OrderRequest,
        ctx: &AuthContext,
    ) -> Result<OrderReceipt> {
        metrics::counter!("order_settlements_total").increment(1);
        let started = std::time::Instant::now();

        // Step 1: authorization.
        if !ctx.can_act_for(req.attendee_id) {
            return Err(SettlementError::Forbidden("not owner or admin"));
        }
        if idempotency_key.trim().is_empty() {
            return Err(SettlementError::Validation(
                "idempotency key is required".to_string(),
            ));
        }
        if req.seat_ids.is_empty() {
            return Err(SettlementError::Validation(
                "seat_ids is required".to_string(),
            ));
        }

        let mut sorted_seats = req.seat_ids.clone();
        sorted_seats.sort();
        let fingerprint = order_fingerprint(&req);

        // Step 2: idempotency. The key insert is the serialization point;
        // losing it means another request got here first.
        let now = self.clock.now();
        if !self
            .store
            .try_insert(idempotency_key, &fingerprint, now)
            .await?
        {
            return self.replay(idempotency_key, &fingerprint).await;
        }

        let result = self.settle(idempotency_key, &req, sorted_seats, now).await;
        match &result {
            Ok(receipt) => {
                metrics::counter!("orders_confirmed_total").increment(1);
                metrics::histogram!("settlement_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(order_id = %receipt.id, amount = %receipt.amount, "order confirmed");
            }
            Err(
                SettlementError::PaymentDeclined { .. } | SettlementError::PaymentTimeout { .. },
            ) => {
                // Designed outcomes: the PENDING response was cached and the
                // key stays bound to this payload.
                metrics::histogram!("settlement_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
            }
            Err(_) => {
                // Failed before any response was cached: free the key so a
                // corrected retry is not reported as in flight.
                if let Err(err) = self.store.discard(idempotency_key).await {
                    tracing::warn!(error = %err, "failed to discard idempotency key after abort");
                }
            }
        }
        result
    }

    /// Steps 3–8 of the saga, entered only by the first request under a
    /// given idempotency key.
    async fn settle(
        &self,
        idempotency_key: &str,
        req: &OrderRequest,
        sorted_seats: Vec<SeatId>,
        now: DateTime<Utc>,
    ) -> Result<OrderReceipt> {
        // Step 3: hold validation.
        let hold = self
            .store
            .get_hold(req.hold_id)
            .await?
            .ok_or(SettlementError::HoldNotFound(req.hold_id))?;
        if hold.status != HoldStatus::Active {
            return Err(SettlementError::HoldNotActive {
                status: hold.status,
            });
        }
        if hold.attendee_id != req.attendee_id || hold.event_id != req.event_id {
            return Err(SettlementError::HoldOwnershipMismatch);
        }

        // Step 4: the requested seats must be exactly the hold's seats.
        let mut hold_seats = hold.seat_ids.clone();
        hold_seats.sort();
        if hold_seats != sorted_seats {
            return Err(SettlementError::SeatSetMismatch);
        }

        // Step 5: price only seats that are currently HELD.
        let prices = self
            .store
            .held_seat_prices(req.event_id, &sorted_seats)
            .await?;
        if prices.len() != sorted_seats.len() {
            return Err(SettlementError::SeatsNotHeld);
        }
        let amount: Money = sorted_seats
            .iter()
            .filter_map(|seat_id| prices.get(seat_id))
            .copied()
            .sum();

        // Step 6: create the PENDING order with the captured amount.
        let order = self
            .store
            .insert_pending(NewOrder {
                attendee_id: req.attendee_id,
                event_id: req.event_id,
                seat_ids: sorted_seats.clone(),
                amount,
                currency: req.currency.clone(),
                created_at: now,
            })
            .await?;

        // Step 7: simulated payment. Decline and timeout keep the order as
        // an auditable, retryable PENDING artifact; seats stay HELD.
        match PaymentSimulation::from_request(req.simulate.as_deref()) {
            PaymentSimulation::Decline => {
                self.store
                    .record_attempt(
                        order.id,
                        AttemptKind::Authorize,
                        AttemptStatus::Declined,
                        Some("mock-decline"),
                        now,
                    )
                    .await?;
                metrics::counter!("payment_attempts_total", "outcome" => "declined").increment(1);
                let receipt = OrderReceipt::from_order(&order, OrderState::Pending);
                self.cache_response(idempotency_key, &receipt).await;
                tracing::info!(order_id = %order.id, "simulated payment decline");
                return Err(SettlementError::PaymentDeclined { order_id: order.id });
            }
            PaymentSimulation::Timeout => {
                self.store
                    .record_attempt(
                        order.id,
                        AttemptKind::Authorize,
                        AttemptStatus::Timeout,
                        Some("mock-timeout"),
                        now,
                    )
                    .await?;
                metrics::counter!("payment_attempts_total", "outcome" => "timeout").increment(1);
                let receipt = OrderReceipt::from_order(&order, OrderState::Pending);
                self.cache_response(idempotency_key, &receipt).await;
                tracing::info!(order_id = %order.id, "simulated payment timeout");
                return Err(SettlementError::PaymentTimeout { order_id: order.id });
            }
            PaymentSimulation::Approve => {
                self.store
                    .record_attempt(
                        order.id,
                        AttemptKind::Authorize,
                        AttemptStatus::Success,
                        None,
                        now,
                    )
                    .await?;
                self.store
                    .record_attempt(
                        order.id,
                        AttemptKind::Capture,
                        AttemptStatus::Success,
                        None,
                        now,
                    )
                    .await?;
                metrics::counter!("payment_attempts_total", "outcome" => "success").increment(1);
            }
        }

        // Step 8: finalize. Guards against a race between pricing and the
        // SOLD transition; a short count commits nothing.
        let sold = self
            .store
            .finalize_order(order.id, req.event_id, &sorted_seats, now)
            .await?;
        if sold != sorted_seats.len() as u64 {
            // Compensate: the sale cannot complete, so the PENDING order is
            // cancelled rather than left dangling.
            self.store
                .set_state(order.id, OrderState::Cancelled, now)
                .await?;
            return Err(SettlementError::SoldTransitionRace);
        }

        let receipt = OrderReceipt::from_order(&order, OrderState::Confirmed);
        self.cache_response(idempotency_key, &receipt).await;
        Ok(receipt)
    }

    /// Returns the order if the requester is its attendee or an
    /// administrator.
    pub async fn get_order(&self, id: OrderId, ctx: &AuthContext) -> Result<OrderReceipt> {
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or(SettlementError::OrderNotFound(id))?;
        if !ctx.can_act_for(order.attendee_id) {
            return Err(SettlementError::Forbidden("not owner or admin"));
        }
        let state = order.state;
        Ok(OrderReceipt::from_order(&order, state))
    }

    /// Returns the outward order view for downstream consumers. Reflects
    /// only committed state; intentionally unauthenticated.
    pub async fn order_view(&self, id: OrderId) -> Result<OrderView> {
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or(SettlementError::OrderNotFound(id))?;
        Ok(OrderView {
            id: order.id,
            attendee_id: order.attendee_id,
            event_id: order.event_id,
            state: order.state,
        })
    }

    /// Administrative state transition (check-in, completion,
    /// cancellation). Confirmation stays settlement-only.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn update_state(
        &self,
        id: OrderId,
        target: OrderState,
        ctx: &AuthContext,
    ) -> Result<OrderReceipt> {
        if !ctx.is_admin() {
            return Err(SettlementError::Forbidden("administrator role required"));
        }
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or(SettlementError::OrderNotFound(id))?;
        if !order.state.can_transition_to(target) {
            return Err(SettlementError::InvalidTransition {
                from: order.state,
                to: target,
            });
        }

        let updated = self
            .store
            .set_state(id, target, self.clock.now())
            .await?
            .ok_or(SettlementError::OrderNotFound(id))?;
        tracing::info!(order_id = %id, state = %target, "order state updated");
        let state = updated.state;
        Ok(OrderReceipt::from_order(&updated, state))
    }

    /// Replay path: the key already exists. Fingerprint mismatch is a hard
    /// conflict; a matching fingerprint without a cached response means the
    /// first request is still executing.
    async fn replay(&self, key: &str, fingerprint: &str) -> Result<OrderReceipt> {
        let record = self
            .store
            .find(key)
            .await?
            .ok_or(SettlementError::RequestInFlight)?;
        if record.request_hash != fingerprint {
            return Err(SettlementError::KeyReuse);
        }
        let Some(cached) = record.response_json else {
            return Err(SettlementError::RequestInFlight);
        };

        metrics::counter!("idempotent_replays_total").increment(1);
        tracing::info!("replaying cached settlement response");
        Ok(serde_json::from_str(&cached)?)
    }

    /// Caches the response for replays. Non-fatal on failure: the
    /// settlement already committed, only the replay is lost.
    async fn cache_response(&self, key: &str, receipt: &OrderReceipt) {
        match serde_json::to_string(receipt) {
            Ok(json) => {
                if let Err(err) = self.store.store_response(key, Some(receipt.id), &json).await {
                    tracing::warn!(error = %err, "failed to cache idempotent response");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize idempotent response");
            }
        }
    }
}
