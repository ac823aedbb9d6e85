use uuid::Uuid;

use crate::error::EngineError;
use crate::state::AppState;

pub async fn enqueue_order(state: &AppState, order_id: Uuid) -> Result<(), EngineError> {
    state
        .order_tx
        .send(order_id)
        .await
        .map_err(|err| EngineError::Conflict(format!("dispatch queue closed: {err}")))?;

    state.metrics.orders_in_queue.inc();
    Ok(())
}
