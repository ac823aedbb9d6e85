use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::lifecycle::OrderStateMachine;
use crate::engine::matching::MatchingEngine;
use crate::engine::tracking::TrackingIngest;
use crate::fare::FareTable;
use crate::geo::GeoIndex;
use crate::models::event::EngineEvent;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: EngineConfig,
    pub geo: Arc<GeoIndex>,
    pub orders: OrderStateMachine,
    pub matching: MatchingEngine,
    pub tracking: TrackingIngest,
    pub fares: FareTable,
    pub order_tx: mpsc::Sender<Uuid>,
    pub events_tx: broadcast::Sender<EngineEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (order_tx, order_rx) = mpsc::channel(order_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let metrics = Metrics::new();
        let geo = Arc::new(GeoIndex::new(config.agent_staleness));

        (
            Self {
                orders: OrderStateMachine::new(events_tx.clone(), metrics.clone()),
                matching: MatchingEngine::new(
                    geo.clone(),
                    config.clone(),
                    events_tx.clone(),
                    metrics.clone(),
                ),
                tracking: TrackingIngest::new(
                    geo.clone(),
                    config.arrival_radius_m,
                    events_tx.clone(),
                    metrics.clone(),
                ),
                fares: FareTable::default(),
                geo,
                config,
                order_tx,
                events_tx,
                metrics,
            },
            order_rx,
        )
    }

    pub fn with_fares(mut self, fares: FareTable) -> Self {
        self.fares = fares;
        self
    }
}
