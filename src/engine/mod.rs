pub mod dispatcher;
pub mod fleet;
pub mod lifecycle;
pub mod matching;
pub mod orders;
pub mod queue;
pub mod tracking;

use chrono::Utc;

use crate::geo::index::AvailabilityChange;
use crate::models::event::EngineEvent;
use crate::state::AppState;

pub(crate) fn publish_availability(state: &AppState, change: Option<AvailabilityChange>) {
    if let Some(change) = change {
        let _ = state.events_tx.send(EngineEvent::AgentAvailabilityChanged {
            agent_id: change.agent_id,
            available: change.available,
            at: Utc::now(),
        });
    }
}
