//! Hold lifecycle integration tests over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{AttendeeId, AuthContext, Currency, EventId, ManualClock, Money, SeatId, SystemClock};
use inventory::{HoldError, HoldManager};
use store::{HoldStatus, InMemoryStore, InventoryStore, Seat, SeatStatus};

async fn seed_seats(store: &InMemoryStore, event_id: EventId, n: usize) -> Vec<SeatId> {
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        let seat = Seat {
            id: SeatId::new(),
            event_id,
            price: Money::from_cents(7500),
            currency: Currency::new("USD"),
            status: SeatStatus::Available,
        };
        ids.push(seat.id);
        store.put_seat(seat).await.unwrap();
    }
    ids
}

#[tokio::test]
async fn concurrent_holds_never_double_reserve_a_seat() {
    let store = InMemoryStore::new();
    let event_id = EventId::new();
    let seats = seed_seats(&store, event_id, 1).await;
    let manager = Arc::new(HoldManager::new(store.clone(), SystemClock));

    let racers = 16;
    let futures = (0..racers).map(|_| {
        let manager = manager.clone();
        let seats = seats.clone();
        async move {
            let attendee = AttendeeId::new();
            let ctx = AuthContext::attendee(attendee);
            manager
                .create_hold(attendee, event_id, seats, None, &ctx)
                .await
        }
    });

    let results = futures_util::future::join_all(futures).await;
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one racer may reserve the seat");

    // Every loser saw a conflict, not a partial success.
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(HoldError::SeatsUnavailable { .. })
        ));
    }

    let seat = store.get_seat(event_id, seats[0]).await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Held);
}

#[tokio::test]
async fn overlapping_batches_hold_at_most_the_available_seats() {
    let store = InMemoryStore::new();
    let event_id = EventId::new();
    let seats = seed_seats(&store, event_id, 4).await;
    let manager = Arc::new(HoldManager::new(store.clone(), SystemClock));

    // Two batches overlapping on the middle seats race; each is
    // all-or-nothing so at most one can win.
    let batch_a = vec![seats[0], seats[1], seats[2]];
    let batch_b = vec![seats[1], seats[2], seats[3]];

    let futures = [batch_a, batch_b].into_iter().map(|batch| {
        let manager = manager.clone();
        async move {
            let attendee = AttendeeId::new();
            let ctx = AuthContext::attendee(attendee);
            manager
                .create_hold(attendee, event_id, batch, None, &ctx)
                .await
        }
    });
    let results = futures_util::future::join_all(futures).await;
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);

    let mut held = 0;
    for seat_id in &seats {
        let seat = store.get_seat(event_id, *seat_id).await.unwrap().unwrap();
        if seat.status == SeatStatus::Held {
            held += 1;
        }
    }
    assert_eq!(held, 3, "only the winning batch's seats are HELD");
}

#[tokio::test]
async fn released_seats_can_be_held_by_another_attendee() {
    let store = InMemoryStore::new();
    let event_id = EventId::new();
    let seats = seed_seats(&store, event_id, 2).await;
    let manager = HoldManager::new(store, SystemClock);

    let first = AttendeeId::new();
    let first_ctx = AuthContext::attendee(first);
    let hold = manager
        .create_hold(first, event_id, seats.clone(), None, &first_ctx)
        .await
        .unwrap();

    manager.release_hold(hold.id, &first_ctx).await.unwrap();

    let second = AttendeeId::new();
    let second_ctx = AuthContext::attendee(second);
    let rehold = manager
        .create_hold(second, event_id, seats, None, &second_ctx)
        .await
        .unwrap();
    assert_eq!(rehold.attendee_id, second);
}

#[tokio::test]
async fn expired_hold_is_swept_exactly_once() {
    let store = InMemoryStore::new();
    let event_id = EventId::new();
    let seats = seed_seats(&store, event_id, 1).await;
    let clock = ManualClock::starting_at(Utc::now());
    let manager = HoldManager::new(store.clone(), clock.clone());

    let attendee = AttendeeId::new();
    let ctx = AuthContext::attendee(attendee);
    let hold = manager
        .create_hold(attendee, event_id, seats.clone(), Some(1), &ctx)
        .await
        .unwrap();

    clock.advance(Duration::minutes(2));

    let outcome = manager.sweep_expired().await.unwrap();
    assert_eq!(outcome.swept, 1);
    assert_eq!(outcome.failed, 0);

    let stored = store.get_hold(hold.id).await.unwrap().unwrap();
    assert_eq!(stored.status, HoldStatus::Expired);

    // A second sweep over the same window is a no-op.
    let outcome = manager.sweep_expired().await.unwrap();
    assert_eq!(outcome.swept, 0);
    let stored = store.get_hold(hold.id).await.unwrap().unwrap();
    assert_eq!(stored.status, HoldStatus::Expired);
}

#[tokio::test]
async fn swept_seat_is_available_to_the_next_attendee() {
    let store = InMemoryStore::new();
    let event_id = EventId::new();
    let seats = seed_seats(&store, event_id, 1).await;
    let clock = ManualClock::starting_at(Utc::now());
    let manager = HoldManager::new(store.clone(), clock.clone());

    let attendee_a = AttendeeId::new();
    let ctx_a = AuthContext::attendee(attendee_a);
    manager
        .create_hold(attendee_a, event_id, seats.clone(), Some(1), &ctx_a)
        .await
        .unwrap();

    clock.advance(Duration::minutes(2));
    manager.sweep_expired().await.unwrap();

    let seat = store.get_seat(event_id, seats[0]).await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Available);

    let attendee_b = AttendeeId::new();
    let ctx_b = AuthContext::attendee(attendee_b);
    let hold = manager
        .create_hold(attendee_b, event_id, seats, None, &ctx_b)
        .await
        .unwrap();
    assert_eq!(hold.attendee_id, attendee_b);
    assert_eq!(hold.status, HoldStatus::Active);
}

#[tokio::test]
async fn release_after_expiry_keeps_the_expired_status() {
    let store = InMemoryStore::new();
    let event_id = EventId::new();
    let seats = seed_seats(&store, event_id, 1).await;
    let clock = ManualClock::starting_at(Utc::now());
    let manager = HoldManager::new(store.clone(), clock.clone());

    let attendee = AttendeeId::new();
    let ctx = AuthContext::attendee(attendee);
    let hold = manager
        .create_hold(attendee, event_id, seats, Some(1), &ctx)
        .await
        .unwrap();

    clock.advance(Duration::minutes(2));
    manager.sweep_expired().await.unwrap();

    // The attendee's late release succeeds but EXPIRED remains terminal.
    manager.release_hold(hold.id, &ctx).await.unwrap();
    let stored = store.get_hold(hold.id).await.unwrap().unwrap();
    assert_eq!(stored.status, HoldStatus::Expired);
}
