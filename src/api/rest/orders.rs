use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orders::{self, NewOrder};
use crate::error::AppError;
use crate::models::agent::GeoPoint;
use crate::models::order::{Order, ServiceType};
use crate::models::tracking::{PositionSample, ReportReceipt};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/start", post(confirm_start))
        .route("/orders/:id/complete", post(confirm_completion))
        .route("/orders/:id/force-cancel", post(force_cancel))
        .route("/orders/:id/positions", post(report_position))
        .route("/orders/:id/trail", get(get_trail))
        .route("/customers/:id/orders", get(customer_orders))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub service_type: Option<ServiceType>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub actor_id: Uuid,
}

#[derive(Deserialize)]
pub struct AgentRequest {
    pub agent_id: Uuid,
}

#[derive(Deserialize)]
pub struct ForceCancelRequest {
    pub operator_id: Uuid,
}

#[derive(Deserialize)]
pub struct PositionReportRequest {
    pub agent_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::create_order(&state, payload).await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::get_order(&state, id)?))
}

async fn customer_orders(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Order>> {
    Json(orders::customer_orders(&state, customer_id, query.service_type))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::cancel_order(&state, id, payload.actor_id)?))
}

async fn confirm_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::confirm_start(&state, id, payload.agent_id)?))
}

async fn confirm_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::confirm_completion(&state, id, payload.agent_id)?))
}

async fn force_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ForceCancelRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::force_cancel(&state, id, payload.operator_id)?))
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PositionReportRequest>,
) -> Result<Json<ReportReceipt>, AppError> {
    let receipt = orders::report_position(
        &state,
        id,
        payload.agent_id,
        GeoPoint::new(payload.lat, payload.lng),
        payload.timestamp.unwrap_or_else(Utc::now),
    )?;
    Ok(Json(receipt))
}

async fn get_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PositionSample>>, AppError> {
    orders::get_order(&state, id)?;
    Ok(Json(state.tracking.trail(id)))
}
