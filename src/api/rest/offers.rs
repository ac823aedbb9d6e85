use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orders::respond_to_offer;
use crate::error::AppError;
use crate::models::offer::Offer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/offers/:id/respond", post(respond))
}

#[derive(Deserialize)]
pub struct OfferResponseRequest {
    pub agent_id: Uuid,
    pub accept: bool,
}

async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<Offer>, AppError> {
    let offer = respond_to_offer(&state, id, payload.agent_id, payload.accept)?;
    Ok(Json(offer))
}
