//! Recurring hold-expiry sweeper.
//!
//! A single repeating task, not request-driven. Reclamation is
//! at-least-once and best-effort: a hold may stay over-held for up to one
//! interval past expiry, and a crash mid-sweep loses nothing because each
//! hold's expiry is independently idempotent.

use std::sync::Arc;
use std::time::Duration;

use common::Clock;
use store::InventoryStore;

use crate::holds::HoldManager;

/// Sweeper cadence configuration.
#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    /// Delay between the end of one sweep and the start of the next.
    pub interval: Duration,
    /// Delay before the first sweep, letting the process warm up.
    pub startup_delay: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            startup_delay: Duration::from_secs(20),
        }
    }
}

/// Background task that periodically expires abandoned holds.
pub struct HoldSweeper<S, C> {
    manager: Arc<HoldManager<S, C>>,
    config: SweeperConfig,
}

impl<S, C> HoldSweeper<S, C>
where
    S: InventoryStore + 'static,
    C: Clock + 'static,
{
    /// Creates a new sweeper over the given manager.
    pub fn new(manager: Arc<HoldManager<S, C>>, config: SweeperConfig) -> Self {
        Self { manager, config }
    }

    /// Spawns the recurring sweep task.
    ///
    /// The interval is measured from the end of the previous run, not
    /// wall-clock-aligned. The task runs until the handle is aborted or the
    /// runtime shuts down.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.config.startup_delay).await;
            loop {
                let started = std::time::Instant::now();
                match self.manager.sweep_expired().await {
                    Ok(outcome) if outcome.swept + outcome.failed > 0 => {
                        tracing::info!(
                            swept = outcome.swept,
                            failed = outcome.failed,
                            "expiry sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        // The query itself failed; holds stay ACTIVE and the
                        // next tick retries them.
                        tracing::warn!(error = %err, "expiry sweep failed");
                    }
                }
                metrics::counter!("sweeper_runs_total").increment(1);
                metrics::histogram!("sweep_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tokio::time::sleep(self.config.interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{AttendeeId, AuthContext, Currency, EventId, ManualClock, Money, SeatId};
    use store::{InMemoryStore, Seat, SeatStatus};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_expires_after_startup_delay() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let seat = Seat {
            id: SeatId::new(),
            event_id,
            price: Money::from_cents(1000),
            currency: Currency::new("USD"),
            status: SeatStatus::Available,
        };
        let seat_id = seat.id;
        store.put_seat(seat).await.unwrap();

        let clock = ManualClock::starting_at(Utc::now());
        let manager = Arc::new(HoldManager::new(store.clone(), clock.clone()));

        let attendee = AttendeeId::new();
        let ctx = AuthContext::attendee(attendee);
        let hold = manager
            .create_hold(attendee, event_id, vec![seat_id], Some(1), &ctx)
            .await
            .unwrap();

        // Push the hold past its expiry before the sweeper's first tick.
        clock.advance(chrono::Duration::minutes(2));

        let sweeper = HoldSweeper::new(
            manager,
            SweeperConfig {
                interval: Duration::from_secs(60),
                startup_delay: Duration::from_millis(100),
            },
        );
        let handle = sweeper.spawn();

        // Paused time: this jumps past the startup delay and lets the first
        // sweep run.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stored = store.get_hold(hold.id).await.unwrap().unwrap();
        assert_eq!(stored.status, store::HoldStatus::Expired);
        let seat = store.get_seat(event_id, seat_id).await.unwrap().unwrap();
        assert_eq!(seat.status, SeatStatus::Available);

        handle.abort();
    }
}
