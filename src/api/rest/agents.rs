use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::fleet::{self, NewAgent};
use crate::error::AppError;
use crate::models::agent::{Agent, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/:id/location", patch(update_location))
        .route("/agents/:id/availability", patch(update_availability))
        .route("/agents/:id/deactivate", post(deactivate_agent))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    pub available: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAgent>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(fleet::register_agent(&state, payload)?))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    Json(fleet::list_agents(&state))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Agent>, AppError> {
    let agent = fleet::update_location(&state, id, payload.location, payload.available)?;
    Ok(Json(agent))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(fleet::set_availability(&state, id, payload.available)?))
}

async fn deactivate_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(fleet::deactivate(&state, id)?))
}
