use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::GeoPoint;
use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub order_id: Uuid,
    pub agent_id: Uuid,
    pub position: GeoPoint,
    pub order_status: OrderStatus,
    // claimed by the device
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub sample: PositionSample,
    pub distance_to_destination_m: Option<f64>,
    pub arrived: bool,
}
