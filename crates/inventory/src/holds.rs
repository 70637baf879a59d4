//! Hold manager: create, retrieve, release, and expire holds.

use std::collections::HashSet;

use chrono::Duration;
use common::{AttendeeId, AuthContext, Clock, EventId, HoldId, SeatId};
use store::{Hold, HoldCreation, HoldStatus, InventoryStore, NewHold, SeatStatus};

use crate::error::{HoldError, Result, SeatConflictReason, SeatDiagnostic};

/// TTL applied when the request omits one or supplies a value below one
/// minute.
pub const DEFAULT_TTL_MINUTES: u32 = 15;

/// Counters for one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Holds transitioned to EXPIRED this sweep.
    pub swept: usize,
    /// Holds that failed and will be retried on the next tick.
    pub failed: usize,
}

/// Orchestrates hold operations over the seat ledger and hold store.
///
/// Every cross-request ordering guarantee derives from the store's
/// conditional updates; the manager itself holds no locks.
pub struct HoldManager<S, C> {
    store: S,
    clock: C,
}

impl<S, C> HoldManager<S, C>
where
    S: InventoryStore,
    C: Clock,
{
    /// Creates a new hold manager.
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Reserves the requested seats for the attendee as one all-or-nothing
    /// unit of work.
    ///
    /// On conflict no hold is created, no seat transition persists, and the
    /// error carries a per-seat diagnostic classification.
    #[tracing::instrument(skip(self, ctx), fields(%attendee_id, %event_id))]
    pub async fn create_hold(
        &self,
        attendee_id: AttendeeId,
        event_id: EventId,
        seat_ids: Vec<SeatId>,
        ttl_minutes: Option<u32>,
        ctx: &AuthContext,
    ) -> Result<Hold> {
        if !ctx.can_act_for(attendee_id) {
            return Err(HoldError::Forbidden(
                "attendee_id does not match authenticated subject",
            ));
        }
        if seat_ids.is_empty() {
            return Err(HoldError::Validation("seat_ids is required".to_string()));
        }
        let distinct: HashSet<SeatId> = seat_ids.iter().copied().collect();
        if distinct.len() != seat_ids.len() {
            return Err(HoldError::Validation(
                "seat_ids contains duplicates".to_string(),
            ));
        }

        let ttl = ttl_minutes.filter(|m| *m >= 1).unwrap_or(DEFAULT_TTL_MINUTES);
        let now = self.clock.now();
        let expires_at = now + Duration::minutes(i64::from(ttl));

        let outcome = self
            .store
            .create_hold(NewHold {
                attendee_id,
                event_id,
                seat_ids: seat_ids.clone(),
                created_at: now,
                expires_at,
            })
            .await?;

        match outcome {
            HoldCreation::Created(hold) => {
                metrics::counter!("holds_created_total").increment(1);
                tracing::info!(hold_id = %hold.id, seats = hold.seat_ids.len(), "hold created");
                Ok(hold)
            }
            HoldCreation::Unavailable { statuses } => {
                metrics::counter!("hold_seat_conflicts_total").increment(1);
                let diagnostics = seat_ids
                    .iter()
                    .map(|seat_id| (*seat_id, classify(statuses.get(seat_id).copied())))
                    .collect();
                Err(HoldError::SeatsUnavailable { diagnostics })
            }
        }
    }

    /// Returns the hold if the requester is its attendee or an
    /// administrator.
    pub async fn get_hold(&self, id: HoldId, ctx: &AuthContext) -> Result<Hold> {
        let hold = self
            .store
            .get_hold(id)
            .await?
            .ok_or(HoldError::NotFound(id))?;
        if !ctx.can_act_for(hold.attendee_id) {
            return Err(HoldError::Forbidden("not allowed to view this hold"));
        }
        Ok(hold)
    }

    /// Releases the hold's seats and marks it RELEASED.
    ///
    /// Releasing a hold that is no longer ACTIVE still reports success so
    /// that internal races (e.g. a sweep landing first) are not leaked to
    /// the client.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn release_hold(&self, id: HoldId, ctx: &AuthContext) -> Result<()> {
        let hold = self
            .store
            .get_hold(id)
            .await?
            .ok_or(HoldError::NotFound(id))?;
        if !ctx.can_act_for(hold.attendee_id) {
            return Err(HoldError::Forbidden("not allowed to release this hold"));
        }

        self.store.close_hold(&hold, HoldStatus::Released).await?;
        metrics::counter!("holds_released_total").increment(1);
        tracing::info!(hold_id = %hold.id, "hold released");
        Ok(())
    }

    /// Expires a hold on behalf of the sweeper.
    ///
    /// Idempotent: a hold that is no longer ACTIVE is left untouched, so a
    /// sweep may safely run twice over the same hold.
    pub async fn expire_and_release(&self, hold: &Hold) -> Result<()> {
        if hold.status != HoldStatus::Active {
            return Ok(());
        }
        self.store.close_hold(hold, HoldStatus::Expired).await?;
        metrics::counter!("holds_expired_total").increment(1);
        tracing::info!(hold_id = %hold.id, "hold expired");
        Ok(())
    }

    /// Runs one expiry sweep: finds expired ACTIVE holds and expires each
    /// in its own unit of work. A per-hold failure is logged and skipped;
    /// the hold stays ACTIVE with its expiry in the past and is retried on
    /// the next sweep.
    pub async fn sweep_expired(&self) -> Result<SweepOutcome> {
        let now = self.clock.now();
        let expired = self.store.find_expired_active_holds(now).await?;

        let mut outcome = SweepOutcome::default();
        for hold in &expired {
            match self.expire_and_release(hold).await {
                Ok(()) => outcome.swept += 1,
                Err(err) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        hold_id = %hold.id,
                        error = %err,
                        "failed to expire hold, will retry next sweep"
                    );
                }
            }
        }
        Ok(outcome)
    }
}

fn classify(observed: Option<SeatStatus>) -> SeatDiagnostic {
    match observed {
        None => SeatDiagnostic {
            reason: SeatConflictReason::NotFoundOrWrongEvent,
            status: None,
        },
        Some(SeatStatus::Available) => SeatDiagnostic {
            reason: SeatConflictReason::RaceConditionOrRetried,
            status: Some(SeatStatus::Available),
        },
        Some(status) => SeatDiagnostic {
            reason: SeatConflictReason::NotAvailable,
            status: Some(status),
        },
    }
}

#[cfg(test)]
mod tests {
    use common::{Currency, Money, SystemClock};
    use store::{InMemoryStore, Seat};

    use super::*;

    async fn seed_seats(store: &InMemoryStore, event_id: EventId, n: usize) -> Vec<SeatId> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            let seat = Seat {
                id: SeatId::new(),
                event_id,
                price: Money::from_cents(4500),
                currency: Currency::new("USD"),
                status: SeatStatus::Available,
            };
            ids.push(seat.id);
            store.put_seat(seat).await.unwrap();
        }
        ids
    }

    fn manager(store: InMemoryStore) -> HoldManager<InMemoryStore, SystemClock> {
        HoldManager::new(store, SystemClock)
    }

    #[tokio::test]
    async fn create_hold_requires_ownership() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 1).await;
        let manager = manager(store);

        let ctx = AuthContext::attendee(AttendeeId::new());
        let result = manager
            .create_hold(AttendeeId::new(), event_id, seats, None, &ctx)
            .await;
        assert!(matches!(result, Err(HoldError::Forbidden(_))));
    }

    #[tokio::test]
    async fn admin_may_hold_for_another_attendee() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 1).await;
        let manager = manager(store);

        let attendee = AttendeeId::new();
        let ctx = AuthContext::admin(AttendeeId::new());
        let hold = manager
            .create_hold(attendee, event_id, seats, None, &ctx)
            .await
            .unwrap();
        assert_eq!(hold.attendee_id, attendee);
    }

    #[tokio::test]
    async fn create_hold_rejects_empty_and_duplicate_seats() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 1).await;
        let manager = manager(store);

        let attendee = AttendeeId::new();
        let ctx = AuthContext::attendee(attendee);

        let result = manager
            .create_hold(attendee, event_id, vec![], None, &ctx)
            .await;
        assert!(matches!(result, Err(HoldError::Validation(_))));

        let result = manager
            .create_hold(attendee, event_id, vec![seats[0], seats[0]], None, &ctx)
            .await;
        assert!(matches!(result, Err(HoldError::Validation(_))));
    }

    #[tokio::test]
    async fn invalid_ttl_falls_back_to_default() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 1).await;
        let manager = manager(store);

        let attendee = AttendeeId::new();
        let ctx = AuthContext::attendee(attendee);
        let hold = manager
            .create_hold(attendee, event_id, seats, Some(0), &ctx)
            .await
            .unwrap();

        let ttl = hold.expires_at - hold.created_at;
        assert_eq!(ttl, Duration::minutes(i64::from(DEFAULT_TTL_MINUTES)));
    }

    #[tokio::test]
    async fn conflict_carries_per_seat_diagnostics() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 2).await;
        let sold = Seat {
            id: SeatId::new(),
            event_id,
            price: Money::from_cents(4500),
            currency: Currency::new("USD"),
            status: SeatStatus::Sold,
        };
        let sold_id = sold.id;
        store.put_seat(sold).await.unwrap();
        let missing_id = SeatId::new();
        let manager = manager(store);

        let attendee = AttendeeId::new();
        let ctx = AuthContext::attendee(attendee);
        let result = manager
            .create_hold(
                attendee,
                event_id,
                vec![seats[0], sold_id, missing_id],
                None,
                &ctx,
            )
            .await;

        let Err(HoldError::SeatsUnavailable { diagnostics }) = result else {
            panic!("expected seat conflict");
        };
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(
            diagnostics[&seats[0]].reason,
            SeatConflictReason::RaceConditionOrRetried
        );
        assert_eq!(
            diagnostics[&sold_id].reason,
            SeatConflictReason::NotAvailable
        );
        assert_eq!(diagnostics[&sold_id].status, Some(SeatStatus::Sold));
        assert_eq!(
            diagnostics[&missing_id].reason,
            SeatConflictReason::NotFoundOrWrongEvent
        );
    }

    #[tokio::test]
    async fn get_hold_enforces_ownership() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 1).await;
        let manager = manager(store);

        let attendee = AttendeeId::new();
        let ctx = AuthContext::attendee(attendee);
        let hold = manager
            .create_hold(attendee, event_id, seats, None, &ctx)
            .await
            .unwrap();

        let other = AuthContext::attendee(AttendeeId::new());
        assert!(matches!(
            manager.get_hold(hold.id, &other).await,
            Err(HoldError::Forbidden(_))
        ));
        assert!(matches!(
            manager.get_hold(HoldId::new(), &ctx).await,
            Err(HoldError::NotFound(_))
        ));
        assert_eq!(manager.get_hold(hold.id, &ctx).await.unwrap().id, hold.id);
    }

    #[tokio::test]
    async fn release_is_tolerant_of_terminal_holds() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seats = seed_seats(&store, event_id, 1).await;
        let manager = manager(store.clone());

        let attendee = AttendeeId::new();
        let ctx = AuthContext::attendee(attendee);
        let hold = manager
            .create_hold(attendee, event_id, seats.clone(), None, &ctx)
            .await
            .unwrap();

        manager.release_hold(hold.id, &ctx).await.unwrap();
        // A second release of the now-RELEASED hold still succeeds.
        manager.release_hold(hold.id, &ctx).await.unwrap();

        let stored = store.get_hold(hold.id).await.unwrap().unwrap();
        assert_eq!(stored.status, HoldStatus::Released);
        let seat = store.get_seat(event_id, seats[0]).await.unwrap().unwrap();
        assert_eq!(seat.status, SeatStatus::Available);
    }
}
