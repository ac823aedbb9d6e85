use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::Transition;
use crate::engine::matching::MatchResult;
use crate::engine::orders::frozen_estimate;
use crate::engine::publish_availability;
use crate::error::EngineError;
use crate::models::order::{CancelReason, OrderStatus};
use crate::state::AppState;

pub async fn run_dispatcher(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("dispatcher started");

    while let Some(order_id) = order_rx.recv().await {
        state.metrics.orders_in_queue.dec();

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatch_order(&state, order_id).await {
                warn!(order_id = %order_id, error = %err, "dispatch failed");
            }
        });
    }

    warn!("dispatcher stopped: queue channel closed");
}

pub async fn dispatch_order(state: &AppState, order_id: Uuid) -> Result<MatchResult, EngineError> {
    let abort_rx = state.matching.register(order_id);

    // Checked after registering so a cancel landing in between still aborts us.
    let order = match state.orders.get(order_id) {
        Ok(order) if order.status == OrderStatus::Matching => order,
        Ok(_) => {
            state.matching.unregister(order_id);
            return Ok(MatchResult::Aborted);
        }
        Err(err) => {
            state.matching.unregister(order_id);
            return Err(err);
        }
    };

    let result = state.matching.match_order(&order, abort_rx).await;
    state.matching.unregister(order_id);

    match &result {
        MatchResult::Matched { agent_id, .. } => {
            let estimated_fare = frozen_estimate(state, &order);
            let accepted = state.orders.apply(
                order_id,
                Transition::Accept {
                    agent_id: *agent_id,
                    estimated_fare,
                },
            );
            if let Err(err) = accepted {
                warn!(
                    order_id = %order_id,
                    agent_id = %agent_id,
                    error = %err,
                    "order left matching before acceptance; releasing agent"
                );
                publish_availability(state, state.geo.release(*agent_id, order_id));
                return Err(err);
            }
        }
        MatchResult::Exhausted => {
            state.orders.apply(
                order_id,
                Transition::Cancel {
                    reason: CancelReason::MatchExhausted,
                },
            )?;
            warn!(order_id = %order_id, "{}", EngineError::MatchExhausted(order_id));
        }
        MatchResult::Aborted => {}
    }

    Ok(result)
}
