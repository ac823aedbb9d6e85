use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::{AgentRole, GeoPoint, VehicleClass};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Ride,
    Delivery,
}

impl ServiceType {
    pub fn agent_role(&self) -> AgentRole {
        match self {
            ServiceType::Ride => AgentRole::Driver,
            ServiceType::Delivery => AgentRole::DeliveryPartner,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Requested,
    Matching,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    ForceCancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::ForceCancelled
        )
    }

    pub fn is_trackable(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::InProgress)
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            OrderStatus::Requested => "requested",
            OrderStatus::Matching => "matching",
            OrderStatus::Accepted => "accepted",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::ForceCancelled => "force_cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    CustomerCancelled,
    AgentCancelled,
    MatchExhausted,
    OperatorForceCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub customer_id: Uuid,
    pub origin: GeoPoint,
    pub destination: Option<GeoPoint>,
    pub vehicle_class: VehicleClass,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub service_type: ServiceType,
    pub request: Request,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub assigned_agent: Option<Uuid>,
    pub demand_factor: f64,
    pub estimated_fare: Option<f64>,
    pub eta_minutes: Option<u32>,
    pub final_fare: Option<f64>,
    pub cancel_reason: Option<CancelReason>,
    pub needs_reconciliation: bool,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(service_type: ServiceType, request: Request, items: Vec<OrderItem>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_type,
            request,
            items,
            status: OrderStatus::Requested,
            assigned_agent: None,
            demand_factor: 1.0,
            estimated_fare: None,
            eta_minutes: None,
            final_fare: None,
            cancel_reason: None,
            needs_reconciliation: false,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_assigned_to(&self, agent_id: Uuid) -> bool {
        self.assigned_agent == Some(agent_id)
    }

    pub fn matching_since(&self) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .rev()
            .find(|change| change.to == OrderStatus::Matching)
            .map(|change| change.at)
    }
}
