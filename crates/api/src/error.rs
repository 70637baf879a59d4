//! API error types with HTTP response mapping.
//!
//! Conflict responses always carry a machine-readable `reason` so that
//! clients can distinguish "try different seats" from "retry the same
//! request".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::HoldError;
use orders::SettlementError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request carried no usable identity.
    Unauthorized(&'static str),
    /// Bad request from the client.
    BadRequest(String),
    /// Hold operation error.
    Hold(HoldError),
    /// Settlement operation error.
    Settlement(SettlementError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            ApiError::Hold(err) => hold_error_response(err),
            ApiError::Settlement(err) => settlement_error_response(err),
        }
    }
}

impl From<HoldError> for ApiError {
    fn from(err: HoldError) -> Self {
        ApiError::Hold(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, axum::Json(body)).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    // Store failures are logged with detail but reported opaquely.
    tracing::error!(error = %err, "internal server error");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

fn hold_error_response(err: HoldError) -> Response {
    match err {
        HoldError::Forbidden(_) => error_body(StatusCode::FORBIDDEN, &err.to_string()),
        HoldError::Validation(_) => error_body(StatusCode::BAD_REQUEST, &err.to_string()),
        HoldError::NotFound(_) => error_body(StatusCode::NOT_FOUND, &err.to_string()),
        HoldError::SeatsUnavailable { ref diagnostics } => {
            let body = serde_json::json!({
                "error": err.to_string(),
                "reason": "seats_unavailable",
                "seats": diagnostics,
            });
            (StatusCode::CONFLICT, axum::Json(body)).into_response()
        }
        HoldError::Store(store_err) => internal_error(store_err),
    }
}

fn settlement_error_response(err: SettlementError) -> Response {
    let status = match &err {
        SettlementError::Forbidden(_) => StatusCode::FORBIDDEN,
        SettlementError::Validation(_) | SettlementError::HoldNotFound(_) => {
            StatusCode::BAD_REQUEST
        }
        SettlementError::HoldOwnershipMismatch => StatusCode::FORBIDDEN,
        SettlementError::HoldNotActive { .. }
        | SettlementError::SeatSetMismatch
        | SettlementError::SeatsNotHeld
        | SettlementError::SoldTransitionRace
        | SettlementError::KeyReuse
        | SettlementError::RequestInFlight
        | SettlementError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SettlementError::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
        SettlementError::PaymentTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        SettlementError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::Store(_) | SettlementError::Serialization(_) => {
            return internal_error(err);
        }
    };

    let mut body = serde_json::json!({ "error": err.to_string() });
    if let Some(reason) = err.conflict_reason() {
        body["reason"] = serde_json::Value::String(reason.to_string());
    }
    match &err {
        SettlementError::PaymentDeclined { order_id }
        | SettlementError::PaymentTimeout { order_id } => {
            body["order_id"] = serde_json::Value::String(order_id.to_string());
        }
        _ => {}
    }

    (status, axum::Json(body)).into_response()
}
