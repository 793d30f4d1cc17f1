use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::status::{self, OrderEvent};
use crate::error::AppError;
use crate::geo::resolver::resolve_bounded;
use crate::models::driver::Driver;
use crate::models::handoff::{HandoffStatus, OrderHandoff};
use crate::models::order::{OrderStatus, Stop, TransportOrder, Vehicle};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub pickup: Stop,
    pub dropoff: Stop,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub driver_price: Option<f64>,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BillingRequest {
    pub event: OrderEvent,
}

pub fn create_driver(
    state: &AppState,
    actor: &Actor,
    request: CreateDriverRequest,
) -> Result<Driver, AppError> {
    state.policy.ensure_staff(actor, actor.company_id)?;
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        company_id: actor.company_id,
        name: request.name.trim().to_string(),
        active: true,
        created_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(driver)
}

pub fn list_drivers(state: &AppState, actor: &Actor) -> Vec<Driver> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| entry.value().company_id == actor.company_id)
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by(|a, b| a.name.cmp(&b.name));
    drivers
}

pub fn set_driver_active(
    state: &AppState,
    actor: &Actor,
    driver_id: Uuid,
    active: bool,
) -> Result<Driver, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
    state.policy.ensure_staff(actor, driver.company_id)?;

    driver.active = active;
    Ok(driver.clone())
}

fn validate_stop(label: &str, stop: &Stop) -> Result<(), AppError> {
    if stop.address.trim().is_empty() && stop.city.trim().is_empty() {
        return Err(AppError::BadRequest(format!(
            "{label} needs an address or a city"
        )));
    }
    Ok(())
}

fn active_driver(state: &AppState, driver_id: Uuid, company_id: Uuid) -> Result<Driver, AppError> {
    let driver = state.driver(driver_id)?;
    if driver.company_id != company_id {
        return Err(AppError::BadRequest(format!(
            "driver {driver_id} belongs to another company"
        )));
    }
    if !driver.active {
        return Err(AppError::Conflict(format!("driver {driver_id} is inactive")));
    }
    Ok(driver)
}

pub async fn create_order(
    state: &AppState,
    actor: &Actor,
    request: CreateOrderRequest,
) -> Result<TransportOrder, AppError> {
    state.policy.ensure_staff(actor, actor.company_id)?;
    validate_stop("pickup", &request.pickup)?;
    validate_stop("dropoff", &request.dropoff)?;
    if let Some(price) = request.driver_price {
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::BadRequest(
                "driver_price must be a non-negative amount".to_string(),
            ));
        }
    }
    let driver = request
        .driver_id
        .map(|driver_id| active_driver(state, driver_id, actor.company_id))
        .transpose()?;

    let distance_km = resolve_bounded(
        state.resolver.as_ref(),
        &request.pickup.location(),
        &request.dropoff.location(),
        state.distance_timeout,
        &state.metrics,
    )
    .await;

    let now = Utc::now();
    let mut order = TransportOrder {
        id: Uuid::new_v4(),
        company_id: actor.company_id,
        status: OrderStatus::New,
        pickup: request.pickup,
        dropoff: request.dropoff,
        vehicle: request.vehicle,
        assigned_driver_id: None,
        assigned_driver_name: None,
        distance_km,
        driver_price: request.driver_price,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };
    if let Some(driver) = driver {
        order.assign(driver.id, driver.name);
        status::apply(&mut order, OrderEvent::DriverAssigned, &state.metrics)?;
    }

    state.store_order(order.clone());
    state.notify(&order, "created");
    info!(order_id = %order.id, distance_km = ?order.distance_km, "order created");

    Ok(order)
}

pub fn get_order(state: &AppState, actor: &Actor, order_id: Uuid) -> Result<TransportOrder, AppError> {
    let order = state.order(order_id)?;
    state.policy.ensure_company(actor, order.company_id)?;
    if !state.policy.can_view_order(actor, &order) {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }
    Ok(order)
}

pub fn list_orders(
    state: &AppState,
    actor: &Actor,
    status: Option<OrderStatus>,
) -> Vec<TransportOrder> {
    let mut orders: Vec<TransportOrder> = state
        .orders
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|order| order.company_id == actor.company_id)
        .filter(|order| status.is_none_or(|wanted| order.status == wanted))
        .filter(|order| state.policy.can_view_order(actor, order))
        .collect();
    orders.sort_by_key(|order| order.created_at);
    orders
}

pub async fn assign_driver(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<TransportOrder, AppError> {
    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;
    state.policy.ensure_staff(actor, order.company_id)?;
    let driver = active_driver(state, driver_id, order.company_id)?;
    if order.status == OrderStatus::Zwischenabgabe {
        // A parked vehicle with an open handoff goes to whoever accepts it.
        status::guard_no_pending_handoff(order_id, state.pending_handoff_id(order_id))?;
    }
    status::ensure_transition(&order, OrderEvent::DriverAssigned)?;

    order.assign(driver.id, driver.name);
    status::apply(&mut order, OrderEvent::DriverAssigned, &state.metrics)?;
    state.store_order(order.clone());
    state.notify(&order, OrderEvent::DriverAssigned.as_str());

    Ok(order)
}

pub async fn cancel_order(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
) -> Result<TransportOrder, AppError> {
    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;
    state.policy.ensure_staff(actor, order.company_id)?;
    status::ensure_transition(&order, OrderEvent::Cancelled)?;

    if let Some(handoff_id) = state.pending_handoff_id(order_id) {
        state.release_pending_slot(order_id, handoff_id);
    }
    for mut handoff in state
        .handoffs_for(order_id)
        .into_iter()
        .filter(OrderHandoff::is_pending)
    {
        handoff.status = HandoffStatus::Cancelled;
        info!(order_id = %order_id, handoff_id = %handoff.id, "pending handoff cancelled");
        state.handoffs.insert(handoff.id, handoff);
    }
    status::apply(&mut order, OrderEvent::Cancelled, &state.metrics)?;
    state.store_order(order.clone());
    state.notify(&order, OrderEvent::Cancelled.as_str());

    Ok(order)
}

/// Moves a completed order through review and billing.
pub async fn advance_billing(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    event: OrderEvent,
) -> Result<TransportOrder, AppError> {
    if !matches!(
        event,
        OrderEvent::SentToReview | OrderEvent::MarkedReadyForBilling | OrderEvent::BillingApproved
    ) {
        return Err(AppError::BadRequest(format!(
            "{} is not a billing event",
            event.as_str()
        )));
    }

    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;
    if event == OrderEvent::BillingApproved {
        state.policy.ensure_admin(actor, order.company_id)?;
    } else {
        state.policy.ensure_staff(actor, order.company_id)?;
    }

    status::apply(&mut order, event, &state.metrics)?;
    state.store_order(order.clone());
    state.notify(&order, event.as_str());

    Ok(order)
}
