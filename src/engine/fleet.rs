use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::publish_availability;
use crate::error::EngineError;
use crate::models::agent::{Agent, AgentRole, GeoPoint, VehicleClass};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub role: AgentRole,
    pub vehicle_class: VehicleClass,
    pub location: Option<GeoPoint>,
    pub rating: Option<f64>,
    #[serde(default)]
    pub available: bool,
}

pub fn register_agent(state: &AppState, input: NewAgent) -> Result<Agent, EngineError> {
    if input.name.trim().is_empty() {
        return Err(EngineError::BadRequest("name cannot be empty".to_string()));
    }
    if !input.role.operates(input.vehicle_class) {
        return Err(EngineError::BadRequest(format!(
            "{:?} agents cannot register a {:?}",
            input.role, input.vehicle_class
        )));
    }
    if let Some(location) = &input.location {
        location.validate()?;
    }

    let mut agent = Agent::new(input.name, input.role, input.vehicle_class);
    agent.rating = input.rating.unwrap_or(5.0).clamp(0.0, 5.0);
    agent.position = input.location;
    agent.available = input.available && input.location.is_some();

    let agent = state.geo.register(agent);
    info!(agent_id = %agent.id, role = ?agent.role, "agent registered");
    if agent.available {
        publish_availability(
            state,
            Some(crate::geo::index::AvailabilityChange {
                agent_id: agent.id,
                available: true,
            }),
        );
    }

    Ok(agent)
}

pub fn list_agents(state: &AppState) -> Vec<Agent> {
    state.geo.list()
}

pub fn update_location(
    state: &AppState,
    agent_id: Uuid,
    location: GeoPoint,
    available: Option<bool>,
) -> Result<Agent, EngineError> {
    location.validate()?;
    let current = state
        .geo
        .get(agent_id)
        .ok_or(EngineError::AgentNotFound(agent_id))?;

    let (agent, change) = state.geo.upsert(
        agent_id,
        location,
        current.vehicle_class,
        available.unwrap_or(current.available),
    )?;
    publish_availability(state, change);
    Ok(agent)
}

pub fn set_availability(state: &AppState, agent_id: Uuid, available: bool) -> Result<Agent, EngineError> {
    let (agent, change) = state.geo.set_availability(agent_id, available)?;
    publish_availability(state, change);
    Ok(agent)
}

pub fn deactivate(state: &AppState, agent_id: Uuid) -> Result<Agent, EngineError> {
    let (agent, change) = state.geo.deactivate(agent_id)?;
    publish_availability(state, change);
    info!(agent_id = %agent_id, "agent deactivated");
    Ok(agent)
}
