use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::geo::{haversine_m, path_length_km, GeoIndex};
use crate::models::agent::GeoPoint;
use crate::models::event::EngineEvent;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::{PositionSample, ReportReceipt};
use crate::observability::metrics::Metrics;

#[derive(Default)]
struct Trail {
    samples: Vec<PositionSample>,
    latest: Option<DateTime<Utc>>,
    arrived: bool,
}

pub struct TrackingIngest {
    trails: DashMap<Uuid, Trail>,
    geo: Arc<GeoIndex>,
    arrival_radius_m: f64,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
}

impl TrackingIngest {
    pub fn new(
        geo: Arc<GeoIndex>,
        arrival_radius_m: f64,
        events_tx: broadcast::Sender<EngineEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            trails: DashMap::new(),
            geo,
            arrival_radius_m,
            events_tx,
            metrics,
        }
    }

    // Callers hold the order entry so the status cannot move underneath.
    pub fn report(
        &self,
        order: &Order,
        agent_id: Uuid,
        position: GeoPoint,
        timestamp: DateTime<Utc>,
    ) -> Result<ReportReceipt, EngineError> {
        if !order.status.is_trackable() {
            self.count("rejected");
            return Err(EngineError::NotTrackable {
                status: order.status,
            });
        }
        if !order.is_assigned_to(agent_id) {
            self.count("unauthorized");
            warn!(
                order_id = %order.id,
                agent_id = %agent_id,
                "position report from an agent not assigned to the order"
            );
            return Err(EngineError::UnauthorizedReporter {
                order_id: order.id,
                agent_id,
            });
        }
        position.validate()?;

        let distance_to_destination_m = order
            .request
            .destination
            .as_ref()
            .map(|destination| haversine_m(&position, destination));
        let within_arrival =
            distance_to_destination_m.is_some_and(|distance| distance <= self.arrival_radius_m);

        let (sample, first_arrival) = {
            let mut trail = self.trails.entry(order.id).or_default();

            let stale = trail.latest.is_some_and(|latest| timestamp < latest);
            let sample = PositionSample {
                order_id: order.id,
                agent_id,
                position,
                order_status: order.status,
                timestamp,
                received_at: Utc::now(),
                stale,
            };
            trail.samples.push(sample.clone());
            if !stale {
                trail.latest = Some(timestamp);
            }

            let first_arrival = within_arrival && !trail.arrived;
            if first_arrival {
                trail.arrived = true;
            }
            (sample, first_arrival)
        };

        if sample.stale {
            self.count("stale");
            debug!(order_id = %order.id, agent_id = %agent_id, "out-of-order position sample");
        } else {
            self.count("accepted");
        }

        if let Err(err) = self.geo.update_position(agent_id, position) {
            debug!(agent_id = %agent_id, error = %err, "reporter missing from geo index");
        }

        if first_arrival {
            info!(order_id = %order.id, agent_id = %agent_id, "agent arrived at destination");
            let _ = self.events_tx.send(EngineEvent::Arrived {
                order_id: order.id,
                agent_id,
                at: sample.received_at,
            });
        }

        Ok(ReportReceipt {
            sample,
            distance_to_destination_m,
            arrived: within_arrival,
        })
    }

    pub fn trail(&self, order_id: Uuid) -> Vec<PositionSample> {
        self.trails
            .get(&order_id)
            .map(|trail| trail.samples.clone())
            .unwrap_or_default()
    }

    // Anchored at the last position seen before the trip started.
    pub fn trip_km(&self, order_id: Uuid) -> f64 {
        let mut samples = self.trail(order_id);
        samples.sort_by_key(|sample| sample.timestamp);

        let pickup = samples
            .iter()
            .rfind(|sample| sample.order_status == OrderStatus::Accepted);
        let trip = samples
            .iter()
            .filter(|sample| sample.order_status == OrderStatus::InProgress);
        path_length_km(pickup.into_iter().chain(trip).map(|sample| &sample.position))
    }

    fn count(&self, outcome: &str) {
        self.metrics
            .tracking_reports_total
            .with_label_values(&[outcome])
            .inc();
    }
}
