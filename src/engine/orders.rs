use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::Transition;
use crate::engine::publish_availability;
use crate::engine::queue::enqueue_order;
use crate::error::EngineError;
use crate::fare::{normalize_demand, FareEstimate};
use crate::models::agent::{GeoPoint, VehicleClass};
use crate::models::offer::Offer;
use crate::models::order::{CancelReason, Order, OrderItem, Request, ServiceType};
use crate::models::tracking::ReportReceipt;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub service_type: ServiceType,
    pub origin: GeoPoint,
    pub destination: Option<GeoPoint>,
    pub vehicle_class: VehicleClass,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub demand_factor: Option<f64>,
}

pub fn quote(
    state: &AppState,
    origin: &GeoPoint,
    destination: &GeoPoint,
    vehicle_class: VehicleClass,
    demand_factor: f64,
) -> Result<FareEstimate, EngineError> {
    origin.validate()?;
    destination.validate()?;
    Ok(state
        .fares
        .estimate(origin, destination, vehicle_class, demand_factor))
}

pub(crate) fn frozen_estimate(state: &AppState, order: &Order) -> f64 {
    order.estimated_fare.unwrap_or_else(|| {
        state
            .fares
            .estimate_for_distance(0.0, order.request.vehicle_class, order.demand_factor)
            .fare
    })
}

pub async fn create_order(state: &AppState, input: NewOrder) -> Result<Order, EngineError> {
    input.origin.validate()?;
    if let Some(destination) = &input.destination {
        destination.validate()?;
    }
    if !input.service_type.agent_role().operates(input.vehicle_class) {
        return Err(EngineError::BadRequest(format!(
            "no {:?} agent operates a {:?}",
            input.service_type.agent_role(),
            input.vehicle_class
        )));
    }
    if input.service_type == ServiceType::Ride && input.destination.is_none() {
        return Err(EngineError::BadRequest(
            "rides require a destination".to_string(),
        ));
    }
    for item in &input.items {
        if item.quantity == 0 || !item.unit_price.is_finite() || item.unit_price < 0.0 {
            return Err(EngineError::BadRequest(format!(
                "invalid order item {}",
                item.name
            )));
        }
    }

    let mut order = Order::new(
        input.service_type,
        Request {
            customer_id: input.customer_id,
            origin: input.origin,
            destination: input.destination,
            vehicle_class: input.vehicle_class,
            created_at: Utc::now(),
        },
        input.items,
    );
    order.demand_factor = normalize_demand(input.demand_factor.unwrap_or(1.0));

    if let Some(destination) = &order.request.destination {
        let estimate = state.fares.estimate(
            &order.request.origin,
            destination,
            order.request.vehicle_class,
            order.demand_factor,
        );
        order.estimated_fare = Some(estimate.fare);
        order.eta_minutes = Some(estimate.eta_minutes);
    }

    let order = state.orders.insert(order);
    let matching = state.orders.apply(order.id, Transition::BeginMatching)?;
    enqueue_order(state, order.id).await?;

    info!(
        order_id = %order.id,
        customer_id = %order.request.customer_id,
        service_type = ?order.service_type,
        "order created"
    );

    Ok(matching.order)
}

pub fn get_order(state: &AppState, order_id: Uuid) -> Result<Order, EngineError> {
    state.orders.get(order_id)
}

pub fn customer_orders(
    state: &AppState,
    customer_id: Uuid,
    service_type: Option<ServiceType>,
) -> Vec<Order> {
    state.orders.for_customer(customer_id, service_type)
}

pub fn cancel_order(state: &AppState, order_id: Uuid, actor_id: Uuid) -> Result<Order, EngineError> {
    let order = state.orders.get(order_id)?;

    let reason = if actor_id == order.request.customer_id {
        CancelReason::CustomerCancelled
    } else if order.is_assigned_to(actor_id) {
        CancelReason::AgentCancelled
    } else {
        warn!(order_id = %order_id, actor_id = %actor_id, "cancel from unrelated actor");
        return Err(EngineError::UnauthorizedActor { order_id, actor_id });
    };

    let outcome = state.orders.apply(order_id, Transition::Cancel { reason })?;
    state.matching.abort(order_id);
    release_assigned(state, &outcome.order);

    Ok(outcome.order)
}

pub fn confirm_start(state: &AppState, order_id: Uuid, agent_id: Uuid) -> Result<Order, EngineError> {
    let outcome = state
        .orders
        .apply(order_id, Transition::Start { agent_id })?;
    Ok(outcome.order)
}

pub fn confirm_completion(
    state: &AppState,
    order_id: Uuid,
    agent_id: Uuid,
) -> Result<Order, EngineError> {
    let order = state.orders.get(order_id)?;
    if !order.is_assigned_to(agent_id) {
        warn!(order_id = %order_id, agent_id = %agent_id, "completion from an agent not assigned to the order");
        return Err(EngineError::UnauthorizedReporter { order_id, agent_id });
    }

    // Priced under the order entry so no late report can slip in between.
    let mut trip_km = 0.0;
    let outcome = state.orders.apply_with(order_id, |order| {
        trip_km = state.tracking.trip_km(order.id);
        Transition::Complete {
            agent_id,
            final_fare: final_fare(state, order, trip_km),
        }
    })?;
    state.geo.record_completion(agent_id);
    release_assigned(state, &outcome.order);

    info!(
        order_id = %order_id,
        agent_id = %agent_id,
        trip_km,
        final_fare = ?outcome.order.final_fare,
        "order completed"
    );

    Ok(outcome.order)
}

fn final_fare(state: &AppState, order: &Order, trip_km: f64) -> f64 {
    let recomputed = state
        .fares
        .estimate_for_distance(trip_km, order.request.vehicle_class, order.demand_factor)
        .fare;

    match order.estimated_fare {
        Some(estimate) if !state.config.allow_final_below_estimate => recomputed.max(estimate),
        _ => recomputed,
    }
}

pub fn force_cancel(state: &AppState, order_id: Uuid, operator_id: Uuid) -> Result<Order, EngineError> {
    let outcome = state.orders.apply(order_id, Transition::ForceCancel)?;
    release_assigned(state, &outcome.order);

    warn!(
        order_id = %order_id,
        operator_id = %operator_id,
        "order force-cancelled; payment needs manual reconciliation"
    );

    Ok(outcome.order)
}

pub fn report_position(
    state: &AppState,
    order_id: Uuid,
    agent_id: Uuid,
    position: GeoPoint,
    timestamp: DateTime<Utc>,
) -> Result<ReportReceipt, EngineError> {
    state.orders.inspect(order_id, |order| {
        state
            .tracking
            .report(order, agent_id, position, timestamp)
    })?
}

pub fn respond_to_offer(
    state: &AppState,
    offer_id: Uuid,
    agent_id: Uuid,
    accept: bool,
) -> Result<Offer, EngineError> {
    state.matching.respond_to_offer(offer_id, agent_id, accept)
}

fn release_assigned(state: &AppState, order: &Order) {
    if let Some(agent_id) = order.assigned_agent {
        publish_availability(state, state.geo.release(agent_id, order.id));
    }
}
