use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::offer::Offer;
use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    },
    OfferIssued {
        offer: Offer,
    },
    OfferResolved {
        offer: Offer,
    },
    AgentAvailabilityChanged {
        agent_id: Uuid,
        available: bool,
        at: DateTime<Utc>,
    },
    Arrived {
        order_id: Uuid,
        agent_id: Uuid,
        at: DateTime<Utc>,
    },
}
