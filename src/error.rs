use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("agent {0} is unavailable")]
    AgentUnavailable(Uuid),

    #[error("no agent accepted order {0} in time")]
    MatchExhausted(Uuid),

    #[error("agent {agent_id} is not assigned to order {order_id}")]
    UnauthorizedReporter { order_id: Uuid, agent_id: Uuid },

    #[error("actor {actor_id} may not act on order {order_id}")]
    UnauthorizedActor { order_id: Uuid, actor_id: Uuid },

    #[error("order in status {status} does not accept position reports")]
    NotTrackable { status: OrderStatus },

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("agent {0} not found")]
    AgentNotFound(Uuid),

    #[error("offer {0} not found or already resolved")]
    OfferNotFound(Uuid),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::OrderNotFound(_)
            | EngineError::AgentNotFound(_)
            | EngineError::OfferNotFound(_) => AppError::NotFound(message),
            EngineError::BadRequest(_) => AppError::BadRequest(message),
            EngineError::UnauthorizedReporter { .. } | EngineError::UnauthorizedActor { .. } => {
                AppError::Forbidden(message)
            }
            EngineError::InvalidTransition { .. }
            | EngineError::AgentUnavailable(_)
            | EngineError::MatchExhausted(_)
            | EngineError::NotTrackable { .. }
            | EngineError::Conflict(_) => AppError::Conflict(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
