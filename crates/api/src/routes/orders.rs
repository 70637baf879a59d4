//! Order settlement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{AttendeeId, Currency, EventId, HoldId, OrderId, SeatId};
use orders::{OrderReceipt, OrderRequest};
use serde::Deserialize;
use store::{OrderState, OrderView, TicketStore};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::routes::holds::AppState;

/// Header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub attendee_id: AttendeeId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub currency: String,
    pub hold_id: HoldId,
    pub simulate: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderStateUpdateRequest {
    pub state: OrderState,
}

/// POST /orders — settle an order against an ACTIVE hold, idempotently.
/// Requires the `Idempotency-Key` header.
#[tracing::instrument(skip(state, ctx, headers, req))]
pub async fn create<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(ctx): Identity,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderReceipt>), ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing Idempotency-Key header".to_string()))?;

    let receipt = state
        .settlement
        .create_order(
            key,
            OrderRequest {
                attendee_id: req.attendee_id,
                event_id: req.event_id,
                seat_ids: req.seat_ids,
                currency: Currency::new(&req.currency),
                hold_id: req.hold_id,
                simulate: req.simulate,
            },
            &ctx,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /orders/:id — load an order, owner or admin only.
#[tracing::instrument(skip(state, ctx))]
pub async fn get<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(ctx): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderReceipt>, ApiError> {
    let receipt = state.settlement.get_order(id, &ctx).await?;
    Ok(Json(receipt))
}

/// GET /orders/:id/summary — the outward order view for downstream
/// consumers. Committed state only.
#[tracing::instrument(skip(state))]
pub async fn summary<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderView>, ApiError> {
    let view = state.settlement.order_view(id).await?;
    Ok(Json(view))
}

/// PATCH /orders/:id/state — administrative state transition
/// (check-in, completion, cancellation).
#[tracing::instrument(skip(state, ctx, req))]
pub async fn update_state<S: TicketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(ctx): Identity,
    Path(id): Path<OrderId>,
    Json(req): Json<OrderStateUpdateRequest>,
) -> Result<Json<OrderReceipt>, ApiError> {
    let receipt = state.settlement.update_state(id, req.state, &ctx).await?;
    Ok(Json(receipt))
}
