//! PostgreSQL store implementation.
//!
//! Every conditional transition is a single `UPDATE ... WHERE status = $n`
//! statement, so the predicate and the write cannot be separated. Composite
//! operations (hold creation, hold close, sale finalization) run inside one
//! transaction and roll back as a whole.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, AttendeeId, Currency, EventId, HoldId, Money, OrderId, SeatId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::records::{
    AttemptKind, AttemptStatus, Hold, HoldStatus, IdempotencyRecord, NewHold, NewOrder, Order,
    OrderState, PaymentAttempt, Seat, SeatStatus,
};
use crate::store::{HoldCreation, IdempotencyStore, InventoryStore, OrderStore, PaymentLog};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_seat(row: PgRow) -> Result<Seat> {
        Ok(Seat {
            id: SeatId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            price: Money::from_cents(row.try_get("price_cents")?),
            currency: Currency::new(row.try_get::<String, _>("currency")?),
            status: parse_column("status", row.try_get("status")?, SeatStatus::parse)?,
        })
    }

    fn row_to_hold(row: PgRow) -> Result<Hold> {
        Ok(Hold {
            id: HoldId::from_uuid(row.try_get::<Uuid, _>("id")?),
            attendee_id: AttendeeId::from_uuid(row.try_get::<Uuid, _>("attendee_id")?),
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            seat_ids: row
                .try_get::<Vec<Uuid>, _>("seat_ids")?
                .into_iter()
                .map(SeatId::from_uuid)
                .collect(),
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            status: parse_column("status", row.try_get("status")?, HoldStatus::parse)?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            attendee_id: AttendeeId::from_uuid(row.try_get::<Uuid, _>("attendee_id")?),
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            seat_ids: row
                .try_get::<Vec<Uuid>, _>("seat_ids")?
                .into_iter()
                .map(SeatId::from_uuid)
                .collect(),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: Currency::new(row.try_get::<String, _>("currency")?),
            state: parse_column("state", row.try_get("state")?, OrderState::parse)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_attempt(row: PgRow) -> Result<PaymentAttempt> {
        Ok(PaymentAttempt {
            id: AttemptId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            kind: parse_column("kind", row.try_get("kind")?, AttemptKind::parse)?,
            status: parse_column("status", row.try_get("status")?, AttemptStatus::parse)?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_idempotency(row: PgRow) -> Result<IdempotencyRecord> {
        Ok(IdempotencyRecord {
            key: row.try_get("key")?,
            request_hash: row.try_get("request_hash")?,
            response_json: row.try_get("response_json")?,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            created_at: row.try_get("created_at")?,
        })
    }
}

fn parse_column<T>(
    column: &'static str,
    raw: String,
    parse: fn(&str) -> Option<T>,
) -> Result<T> {
    parse(&raw).ok_or(StoreError::Decode { column, value: raw })
}

fn as_uuids(seat_ids: &[SeatId]) -> Vec<Uuid> {
    seat_ids.iter().map(|id| id.as_uuid()).collect()
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn put_seat(&self, seat: Seat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO seats (id, event_id, price_cents, currency, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id, id) DO UPDATE SET
                price_cents = EXCLUDED.price_cents,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status
            "#,
        )
        .bind(seat.id.as_uuid())
        .bind(seat.event_id.as_uuid())
        .bind(seat.price.cents())
        .bind(seat.currency.as_str())
        .bind(seat.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_seat(&self, event_id: EventId, seat_id: SeatId) -> Result<Option<Seat>> {
        let row = sqlx::query(
            "SELECT id, event_id, price_cents, currency, status FROM seats \
             WHERE event_id = $1 AND id = $2",
        )
        .bind(event_id.as_uuid())
        .bind(seat_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_seat).transpose()
    }

    async fn transition_seats(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64> {
        if seat_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE seats SET status = $1 \
             WHERE event_id = $2 AND id = ANY($3) AND status = $4",
        )
        .bind(to.as_str())
        .bind(event_id.as_uuid())
        .bind(as_uuids(seat_ids))
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn seat_statuses(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> Result<HashMap<SeatId, SeatStatus>> {
        let rows = sqlx::query("SELECT id, status FROM seats WHERE event_id = $1 AND id = ANY($2)")
            .bind(event_id.as_uuid())
            .bind(as_uuids(seat_ids))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let id = SeatId::from_uuid(row.try_get::<Uuid, _>("id")?);
                let status = parse_column("status", row.try_get("status")?, SeatStatus::parse)?;
                Ok((id, status))
            })
            .collect()
    }

    async fn held_seat_prices(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
    ) -> Result<HashMap<SeatId, Money>> {
        let rows = sqlx::query(
            "SELECT id, price_cents FROM seats \
             WHERE event_id = $1 AND id = ANY($2) AND status = 'HELD'",
        )
        .bind(event_id.as_uuid())
        .bind(as_uuids(seat_ids))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id = SeatId::from_uuid(row.try_get::<Uuid, _>("id")?);
                let price = Money::from_cents(row.try_get("price_cents")?);
                Ok((id, price))
            })
            .collect()
    }

    async fn create_hold(&self, hold: NewHold) -> Result<HoldCreation> {
        let seat_uuids = as_uuids(&hold.seat_ids);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE seats SET status = 'HELD' \
             WHERE event_id = $1 AND id = ANY($2) AND status = 'AVAILABLE'",
        )
        .bind(hold.event_id.as_uuid())
        .bind(&seat_uuids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != hold.seat_ids.len() as u64 {
            // Roll back the partial transition before reading diagnostics so
            // the observed statuses reflect what other writers committed,
            // not this aborted attempt.
            tx.rollback().await?;
            let statuses = self.seat_statuses(hold.event_id, &hold.seat_ids).await?;
            return Ok(HoldCreation::Unavailable { statuses });
        }

        let id = HoldId::new();
        sqlx::query(
            r#"
            INSERT INTO holds (id, attendee_id, event_id, seat_ids, created_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'ACTIVE')
            "#,
        )
        .bind(id.as_uuid())
        .bind(hold.attendee_id.as_uuid())
        .bind(hold.event_id.as_uuid())
        .bind(&seat_uuids)
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(HoldCreation::Created(Hold {
            id,
            attendee_id: hold.attendee_id,
            event_id: hold.event_id,
            seat_ids: hold.seat_ids,
            created_at: hold.created_at,
            expires_at: hold.expires_at,
            status: HoldStatus::Active,
        }))
    }

    async fn get_hold(&self, id: HoldId) -> Result<Option<Hold>> {
        let row = sqlx::query(
            "SELECT id, attendee_id, event_id, seat_ids, created_at, expires_at, status \
             FROM holds WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_hold).transpose()
    }

    async fn close_hold(&self, hold: &Hold, outcome: HoldStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE seats SET status = 'AVAILABLE' \
             WHERE event_id = $1 AND id = ANY($2) AND status = 'HELD'",
        )
        .bind(hold.event_id.as_uuid())
        .bind(as_uuids(&hold.seat_ids))
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE holds SET status = $1 WHERE id = $2 AND status = 'ACTIVE'")
            .bind(outcome.as_str())
            .bind(hold.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_expired_active_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let rows = sqlx::query(
            "SELECT id, attendee_id, event_id, seat_ids, created_at, expires_at, status \
             FROM holds WHERE status = 'ACTIVE' AND expires_at < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_hold).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_pending(&self, order: NewOrder) -> Result<Order> {
        let id = OrderId::new();
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, attendee_id, event_id, seat_ids, amount_cents, currency, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $7)
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.attendee_id.as_uuid())
        .bind(order.event_id.as_uuid())
        .bind(as_uuids(&order.seat_ids))
        .bind(order.amount.cents())
        .bind(order.currency.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(Order {
            id,
            attendee_id: order.attendee_id,
            event_id: order.event_id,
            seat_ids: order.seat_ids,
            amount: order.amount,
            currency: order.currency,
            state: OrderState::Pending,
            created_at: order.created_at,
            updated_at: order.created_at,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, attendee_id, event_id, seat_ids, amount_cents, currency, state, \
             created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn finalize_order(
        &self,
        id: OrderId,
        event_id: EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let sold = sqlx::query(
            "UPDATE seats SET status = 'SOLD' \
             WHERE event_id = $1 AND id = ANY($2) AND status = 'HELD'",
        )
        .bind(event_id.as_uuid())
        .bind(as_uuids(seat_ids))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if sold != seat_ids.len() as u64 {
            tx.rollback().await?;
            return Ok(sold);
        }

        sqlx::query("UPDATE orders SET state = 'CONFIRMED', updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(sold)
    }

    async fn set_state(
        &self,
        id: OrderId,
        state: OrderState,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            UPDATE orders SET state = $1, updated_at = $2 WHERE id = $3
            RETURNING id, attendee_id, event_id, seat_ids, amount_cents, currency, state,
                      created_at, updated_at
            "#,
        )
        .bind(state.as_str())
        .bind(now)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }
}

#[async_trait]
impl PaymentLog for PostgresStore {
    async fn record_attempt(
        &self,
        order_id: OrderId,
        kind: AttemptKind,
        status: AttemptStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PaymentAttempt> {
        let id = AttemptId::new();
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (id, order_id, kind, status, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(kind.as_str())
        .bind(status.as_str())
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(PaymentAttempt {
            id,
            order_id,
            kind,
            status,
            reason: reason.map(String::from),
            created_at: now,
        })
    }

    async fn attempts_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>> {
        let rows = sqlx::query(
            "SELECT id, order_id, kind, status, reason, created_at \
             FROM payment_attempts WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_attempt).collect()
    }
}

#[async_trait]
impl IdempotencyStore for PostgresStore {
    async fn try_insert(&self, key: &str, request_hash: &str, now: DateTime<Utc>) -> Result<bool> {
        // The primary key on `key` is the serialization point; concurrent
        // inserts race on the constraint, not on a prior read.
        let result = sqlx::query(
            "INSERT INTO idempotency_keys (key, request_hash, created_at) \
             VALUES ($1, $2, $3) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(request_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn store_response(
        &self,
        key: &str,
        order_id: Option<OrderId>,
        response_json: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE idempotency_keys SET order_id = $1, response_json = $2 WHERE key = $3")
            .bind(order_id.map(|id| id.as_uuid()))
            .bind(response_json)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            "SELECT key, request_hash, response_json, order_id, created_at \
             FROM idempotency_keys WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_idempotency).transpose()
    }

    async fn discard(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
