use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::geo::haversine_m;
use crate::models::agent::{Agent, AgentRole, GeoPoint, VehicleClass};

struct FleetEntry {
    agent: Agent,
    seen_at: Option<Instant>,
    pending_offer: Option<Uuid>,
    engaged_order: Option<Uuid>,
}

impl FleetEntry {
    fn is_fresh(&self, now: Instant, staleness: Duration) -> bool {
        self.seen_at
            .map(|seen| now.saturating_duration_since(seen) <= staleness)
            .unwrap_or(false)
    }

    fn is_claimable(&self) -> bool {
        self.agent.active && self.agent.available && self.engaged_order.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub origin: GeoPoint,
    pub role: AgentRole,
    pub vehicle_class: VehicleClass,
    pub radius_m: f64,
    pub limit: usize,
    pub exclude: HashSet<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyAgent {
    pub agent_id: Uuid,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvailabilityChange {
    pub agent_id: Uuid,
    pub available: bool,
}

pub struct GeoIndex {
    entries: DashMap<Uuid, FleetEntry>,
    staleness: Duration,
}

impl GeoIndex {
    pub fn new(staleness: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            staleness,
        }
    }

    pub fn register(&self, agent: Agent) -> Agent {
        let seen_at = agent.position.map(|_| Instant::now());
        self.entries.insert(
            agent.id,
            FleetEntry {
                agent: agent.clone(),
                seen_at,
                pending_offer: None,
                engaged_order: None,
            },
        );
        agent
    }

    pub fn get(&self, agent_id: Uuid) -> Option<Agent> {
        self.entries.get(&agent_id).map(|entry| entry.agent.clone())
    }

    pub fn list(&self) -> Vec<Agent> {
        self.entries
            .iter()
            .map(|entry| entry.value().agent.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_claimable())
            .count()
    }

    // Becoming available is ignored while engaged.
    pub fn upsert(
        &self,
        agent_id: Uuid,
        position: GeoPoint,
        vehicle_class: VehicleClass,
        available: bool,
    ) -> Result<(Agent, Option<AvailabilityChange>), EngineError> {
        let mut entry = self
            .entries
            .get_mut(&agent_id)
            .ok_or(EngineError::AgentNotFound(agent_id))?;

        entry.agent.position = Some(position);
        entry.agent.vehicle_class = vehicle_class;
        entry.seen_at = Some(Instant::now());

        let wanted = available && entry.agent.active && entry.engaged_order.is_none();
        let change = if entry.agent.available != wanted {
            entry.agent.available = wanted;
            Some(AvailabilityChange {
                agent_id,
                available: wanted,
            })
        } else {
            None
        };
        entry.agent.updated_at = Utc::now();

        Ok((entry.agent.clone(), change))
    }

    pub fn update_position(&self, agent_id: Uuid, position: GeoPoint) -> Result<Agent, EngineError> {
        let mut entry = self
            .entries
            .get_mut(&agent_id)
            .ok_or(EngineError::AgentNotFound(agent_id))?;

        entry.agent.position = Some(position);
        entry.seen_at = Some(Instant::now());
        entry.agent.updated_at = Utc::now();
        Ok(entry.agent.clone())
    }

    pub fn set_availability(
        &self,
        agent_id: Uuid,
        available: bool,
    ) -> Result<(Agent, Option<AvailabilityChange>), EngineError> {
        let mut entry = self
            .entries
            .get_mut(&agent_id)
            .ok_or(EngineError::AgentNotFound(agent_id))?;

        if available {
            if !entry.agent.active {
                return Err(EngineError::Conflict(format!(
                    "agent {agent_id} is deactivated"
                )));
            }
            if let Some(order_id) = entry.engaged_order {
                return Err(EngineError::Conflict(format!(
                    "agent {agent_id} is engaged in order {order_id}"
                )));
            }
        }

        let change = if entry.agent.available != available {
            entry.agent.available = available;
            entry.agent.updated_at = Utc::now();
            Some(AvailabilityChange {
                agent_id,
                available,
            })
        } else {
            None
        };

        Ok((entry.agent.clone(), change))
    }

    pub fn deactivate(&self, agent_id: Uuid) -> Result<(Agent, Option<AvailabilityChange>), EngineError> {
        let mut entry = self
            .entries
            .get_mut(&agent_id)
            .ok_or(EngineError::AgentNotFound(agent_id))?;

        entry.agent.active = false;
        entry.agent.updated_at = Utc::now();
        let change = if entry.agent.available {
            entry.agent.available = false;
            Some(AvailabilityChange {
                agent_id,
                available: false,
            })
        } else {
            None
        };

        Ok((entry.agent.clone(), change))
    }

    pub fn query_nearby(&self, query: &NearbyQuery) -> Vec<NearbyAgent> {
        let now = Instant::now();

        let mut candidates: Vec<NearbyAgent> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let fleet = entry.value();
                let agent = &fleet.agent;

                if !fleet.is_claimable()
                    || fleet.pending_offer.is_some()
                    || agent.role != query.role
                    || agent.vehicle_class != query.vehicle_class
                    || query.exclude.contains(&agent.id)
                    || !fleet.is_fresh(now, self.staleness)
                {
                    return None;
                }

                let position = agent.position.as_ref()?;
                let distance_m = haversine_m(&query.origin, position);
                (distance_m <= query.radius_m).then_some(NearbyAgent {
                    agent_id: agent.id,
                    distance_m,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        candidates.truncate(query.limit);
        candidates
    }

    pub fn reserve_for_offer(&self, agent_id: Uuid, offer_id: Uuid) -> Result<(), EngineError> {
        let mut entry = self
            .entries
            .get_mut(&agent_id)
            .ok_or(EngineError::AgentNotFound(agent_id))?;

        if !entry.is_claimable() || entry.pending_offer.is_some() {
            return Err(EngineError::AgentUnavailable(agent_id));
        }

        entry.pending_offer = Some(offer_id);
        Ok(())
    }

    pub fn release_offer(&self, agent_id: Uuid, offer_id: Uuid) {
        if let Some(mut entry) = self.entries.get_mut(&agent_id) {
            if entry.pending_offer == Some(offer_id) {
                entry.pending_offer = None;
            }
        }
    }

    // Compare-and-set under the entry lock: one winner per agent.
    pub fn claim(
        &self,
        agent_id: Uuid,
        offer_id: Uuid,
        order_id: Uuid,
    ) -> Result<AvailabilityChange, EngineError> {
        let mut entry = self
            .entries
            .get_mut(&agent_id)
            .ok_or(EngineError::AgentNotFound(agent_id))?;

        if entry.pending_offer == Some(offer_id) {
            entry.pending_offer = None;
        } else {
            return Err(EngineError::AgentUnavailable(agent_id));
        }

        if !entry.is_claimable() {
            return Err(EngineError::AgentUnavailable(agent_id));
        }

        entry.agent.available = false;
        entry.engaged_order = Some(order_id);
        entry.agent.updated_at = Utc::now();
        debug!(agent_id = %agent_id, order_id = %order_id, "agent claimed");

        Ok(AvailabilityChange {
            agent_id,
            available: false,
        })
    }

    pub fn release(&self, agent_id: Uuid, order_id: Uuid) -> Option<AvailabilityChange> {
        let mut entry = self.entries.get_mut(&agent_id)?;
        if entry.engaged_order != Some(order_id) {
            return None;
        }

        entry.engaged_order = None;
        entry.agent.available = entry.agent.active;
        entry.agent.updated_at = Utc::now();
        Some(AvailabilityChange {
            agent_id,
            available: entry.agent.available,
        })
    }

    pub fn record_completion(&self, agent_id: Uuid) {
        if let Some(mut entry) = self.entries.get_mut(&agent_id) {
            entry.agent.completed_count = entry.agent.completed_count.saturating_add(1);
        }
    }

    pub fn engaged_order(&self, agent_id: Uuid) -> Option<Uuid> {
        self.entries
            .get(&agent_id)
            .and_then(|entry| entry.engaged_order)
    }
}
