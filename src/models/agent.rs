use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(EngineError::BadRequest(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(EngineError::BadRequest(format!(
                "longitude {} out of range",
                self.lng
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Bike,
    Scooter,
    Auto,
    Car,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Driver,
    DeliveryPartner,
}

impl AgentRole {
    pub fn operates(&self, vehicle_class: VehicleClass) -> bool {
        !matches!(
            (self, vehicle_class),
            (AgentRole::Driver, VehicleClass::Scooter)
                | (AgentRole::DeliveryPartner, VehicleClass::Auto)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub role: AgentRole,
    pub vehicle_class: VehicleClass,
    pub position: Option<GeoPoint>,
    pub available: bool,
    pub active: bool,
    pub rating: f64,
    pub completed_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: String, role: AgentRole, vehicle_class: VehicleClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            vehicle_class,
            position: None,
            available: false,
            active: true,
            rating: 5.0,
            completed_count: 0,
            updated_at: Utc::now(),
        }
    }
}
