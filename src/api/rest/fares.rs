use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::orders::quote;
use crate::error::AppError;
use crate::fare::FareEstimate;
use crate::models::agent::{GeoPoint, VehicleClass};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/fares/estimate", post(estimate))
}

#[derive(Deserialize)]
pub struct EstimateRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_class: VehicleClass,
    #[serde(default = "default_demand")]
    pub demand_factor: f64,
}

fn default_demand() -> f64 {
    1.0
}

async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EstimateRequest>,
) -> Result<Json<FareEstimate>, AppError> {
    let estimate = quote(
        &state,
        &payload.origin,
        &payload.destination,
        payload.vehicle_class,
        payload.demand_factor,
    )?;
    Ok(Json(estimate))
}
