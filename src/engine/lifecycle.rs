// requested -> matching -> accepted -> in_progress -> completed
//     |           |           |             |
//     +-----------+-----------+--> cancelled +--> force_cancelled

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::event::EngineEvent;
use crate::models::order::{CancelReason, Order, OrderStatus, ServiceType, StatusChange};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    BeginMatching,
    Accept { agent_id: Uuid, estimated_fare: f64 },
    Start { agent_id: Uuid },
    Complete { agent_id: Uuid, final_fare: f64 },
    Cancel { reason: CancelReason },
    ForceCancel,
}

impl Transition {
    pub fn target(&self) -> OrderStatus {
        match self {
            Transition::BeginMatching => OrderStatus::Matching,
            Transition::Accept { .. } => OrderStatus::Accepted,
            Transition::Start { .. } => OrderStatus::InProgress,
            Transition::Complete { .. } => OrderStatus::Completed,
            Transition::Cancel { .. } => OrderStatus::Cancelled,
            Transition::ForceCancel => OrderStatus::ForceCancelled,
        }
    }
}

pub fn is_legal(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    matches!(
        (from, to),
        (Requested, Matching)
            | (Matching, Accepted)
            | (Accepted, InProgress)
            | (InProgress, Completed)
            | (Requested, Cancelled)
            | (Matching, Cancelled)
            | (Accepted, Cancelled)
            | (InProgress, ForceCancelled)
    )
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub change: StatusChange,
}

pub struct OrderStateMachine {
    orders: DashMap<Uuid, Order>,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
}

impl OrderStateMachine {
    pub fn new(events_tx: broadcast::Sender<EngineEvent>, metrics: Metrics) -> Self {
        Self {
            orders: DashMap::new(),
            events_tx,
            metrics,
        }
    }

    pub fn insert(&self, order: Order) -> Order {
        self.orders.insert(order.id, order.clone());
        order
    }

    pub fn get(&self, order_id: Uuid) -> Result<Order, EngineError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::OrderNotFound(order_id))
    }

    // `f` runs under the entry lock and must not call back into the machine.
    pub fn inspect<R>(&self, order_id: Uuid, f: impl FnOnce(&Order) -> R) -> Result<R, EngineError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;
        Ok(f(order.value()))
    }

    pub fn for_customer(&self, customer_id: Uuid, service_type: Option<ServiceType>) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.request.customer_id == customer_id)
            .filter(|entry| service_type.is_none_or(|kind| entry.service_type == kind))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn count_in(&self, status: OrderStatus) -> usize {
        self.orders
            .iter()
            .filter(|entry| entry.value().status == status)
            .count()
    }

    pub fn apply(
        &self,
        order_id: Uuid,
        transition: Transition,
    ) -> Result<TransitionOutcome, EngineError> {
        self.apply_with(order_id, |_| transition)
    }

    pub fn apply_with(
        &self,
        order_id: Uuid,
        build: impl FnOnce(&Order) -> Transition,
    ) -> Result<TransitionOutcome, EngineError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        let transition = build(&order);
        let from = order.status;
        let to = transition.target();

        if !is_legal(from, to) {
            warn!(
                order_id = %order_id,
                from = %from,
                to = %to,
                "rejected invalid order transition"
            );
            return Err(EngineError::InvalidTransition { from, to });
        }

        match &transition {
            Transition::Start { agent_id } | Transition::Complete { agent_id, .. }
                if !order.is_assigned_to(*agent_id) =>
            {
                warn!(
                    order_id = %order_id,
                    agent_id = %agent_id,
                    "confirmation from an agent not assigned to the order"
                );
                return Err(EngineError::UnauthorizedReporter {
                    order_id,
                    agent_id: *agent_id,
                });
            }
            _ => {}
        }

        match transition {
            Transition::BeginMatching | Transition::Start { .. } => {}
            Transition::Accept {
                agent_id,
                estimated_fare,
            } => {
                order.assigned_agent = Some(agent_id);
                if order.estimated_fare.is_none() {
                    order.estimated_fare = Some(estimated_fare);
                }
            }
            Transition::Complete { final_fare, .. } => {
                order.final_fare = Some(final_fare);
            }
            Transition::Cancel { reason } => {
                order.cancel_reason = Some(reason);
            }
            Transition::ForceCancel => {
                order.cancel_reason = Some(CancelReason::OperatorForceCancelled);
                order.needs_reconciliation = true;
            }
        }

        let change = StatusChange {
            from,
            to,
            at: Utc::now(),
        };
        order.status = to;
        order.updated_at = change.at;
        order.history.push(change.clone());

        self.metrics
            .order_transitions_total
            .with_label_values(&[to.as_label()])
            .inc();
        let _ = self.events_tx.send(EngineEvent::OrderStatusChanged {
            order_id,
            from,
            to,
            at: change.at,
        });

        info!(order_id = %order_id, from = %from, to = %to, "order transitioned");

        Ok(TransitionOutcome {
            order: order.clone(),
            change,
        })
    }
}
