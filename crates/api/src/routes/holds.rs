//! Hold endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AttendeeId, EventId, HoldId, SeatId, SystemClock};
use inventory::HoldManager;
use orders::SettlementService;
use serde::{Deserialize, Serialize};
use store::{Hold, HoldStatus, TicketStore};

use crate::auth::Identity;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: TicketStore> {
    pub holds: Arc<HoldManager<S, SystemClock>>,
    pub settlement: Arc<SettlementService<S, SystemClock>>,
}

#[derive(Deserialize)]
pub struct CreateHoldRequest {
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub ttl_minutes: Option<u32>,
}

#[derive(Serialize)]
pub struct HoldResponse {
    pub id: HoldId,
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        Self {
            id: hold.id,
            attendee_id: hold.attendee_id,
            event_id: hold.event_id,
            seat_ids: hold.seat_ids,
            status: hold.status,
            created_at: hold.created_at,
            expires_at: hold.expires_at,
        }
    }
}

/// POST /holds — reserve seats for an attendee.
#[tracing::instrument(skip(state, ctx, req))]
pub async fn create<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(ctx): Identity,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), ApiError> {
    let hold = state
        .holds
        .create_hold(
            req.attendee_id,
            req.event_id,
            req.seat_ids,
            req.ttl_minutes,
            &ctx,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(hold.into())))
}

/// GET /holds/:id — load a hold, owner or admin only.
#[tracing::instrument(skip(state, ctx))]
pub async fn get<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(ctx): Identity,
    Path(id): Path<HoldId>,
) -> Result<Json<HoldResponse>, ApiError> {
    let hold = state.holds.get_hold(id, &ctx).await?;
    Ok(Json(hold.into()))
}

/// DELETE /holds/:id — release a hold, owner or admin only.
#[tracing::instrument(skip(state, ctx))]
pub async fn release<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(ctx): Identity,
    Path(id): Path<HoldId>,
) -> Result<StatusCode, ApiError> {
    state.holds.release_hold(id, &ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}
