//! Mid-route custody transfers (handoffs) and intermediate stops (shuttles).
//!
//! A handoff parks the vehicle in the field: the order loses its driver and
//! waits in `zwischenabgabe` until a different driver accepts. A shuttle only
//! records a leg; the current driver keeps the order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::engine::ledger;
use crate::engine::status::{self, OrderEvent};
use crate::error::AppError;
use crate::geo::resolver::resolve_bounded;
use crate::models::checklist::ChecklistKind;
use crate::models::handoff::{HandoffStatus, OrderHandoff};
use crate::models::location::Location;
use crate::models::order::TransportOrder;
use crate::models::segment::{OrderSegment, PriceStatus, SegmentKind};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct StopRequest {
    pub location: Location,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffOutcome {
    pub handoff: OrderHandoff,
    pub segment: OrderSegment,
    pub order: TransportOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShuttleOutcome {
    pub segment: OrderSegment,
    pub order: TransportOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub handoff: OrderHandoff,
    pub order: TransportOrder,
}

/// The driver moving the vehicle: the caller when driving, else the assignee.
fn moving_driver(actor: &Actor, order: &TransportOrder) -> Result<Uuid, AppError> {
    if actor.role == Role::Driver {
        return Ok(actor.user_id);
    }

    order.assigned_driver_id.ok_or_else(|| {
        AppError::Conflict(format!("order {} has no assigned driver", order.id))
    })
}

fn ensure_pickup_done(state: &AppState, order_id: Uuid) -> Result<(), AppError> {
    match state.checklist(order_id, ChecklistKind::Pickup) {
        Some(checklist) if checklist.completed => Ok(()),
        _ => Err(AppError::Conflict(format!(
            "order {order_id} has no completed pickup protocol"
        ))),
    }
}

fn clean_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn validate_stop(request: &StopRequest) -> Result<(), AppError> {
    if request.location.address.trim().is_empty() {
        return Err(AppError::BadRequest("location cannot be empty".to_string()));
    }
    Ok(())
}

async fn build_segment(
    state: &AppState,
    order: &TransportOrder,
    driver_id: Uuid,
    kind: SegmentKind,
    handoff_id: Option<Uuid>,
    end_location: Location,
    notes: Option<String>,
) -> OrderSegment {
    let start_location = ledger::next_start(state, order);
    let distance_km = resolve_bounded(
        state.resolver.as_ref(),
        &start_location,
        &end_location,
        state.distance_timeout,
        &state.metrics,
    )
    .await;

    OrderSegment {
        id: Uuid::new_v4(),
        order_id: order.id,
        handoff_id,
        driver_id,
        kind,
        start_location,
        end_location,
        distance_km,
        notes,
        price: None,
        price_status: PriceStatus::Pending,
        created_at: Utc::now(),
    }
}

pub async fn create_handoff(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    request: StopRequest,
) -> Result<HandoffOutcome, AppError> {
    validate_stop(&request)?;
    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;
    state.policy.ensure_order_operator(actor, &order)?;

    ensure_pickup_done(state, order_id)?;
    if state.checklist(order_id, ChecklistKind::Dropoff).is_some() {
        return Err(AppError::Conflict(format!(
            "order {order_id} already started its dropoff protocol"
        )));
    }
    status::guard_no_pending_handoff(order_id, state.pending_handoff_id(order_id))?;
    status::ensure_transition(&order, OrderEvent::HandoffCreated)?;
    let driver_id = moving_driver(actor, &order)?;

    let notes = clean_notes(request.notes);
    let now = Utc::now();
    let handoff = OrderHandoff {
        id: Uuid::new_v4(),
        order_id,
        company_id: order.company_id,
        created_by: driver_id,
        location: request.location.clone(),
        notes: notes.clone(),
        status: HandoffStatus::Pending,
        accepted_by: None,
        created_at: now,
        accepted_at: None,
    };
    let segment = build_segment(
        state,
        &order,
        driver_id,
        SegmentKind::Handoff,
        Some(handoff.id),
        request.location,
        notes,
    )
    .await;

    state.claim_pending_slot(order_id, handoff.id)?;
    state.handoffs.insert(handoff.id, handoff.clone());
    ledger::append(state, segment.clone());
    order.clear_assignment();
    status::apply(&mut order, OrderEvent::HandoffCreated, &state.metrics)?;
    state.store_order(order.clone());

    state.metrics.handoffs_total.with_label_values(&["created"]).inc();
    state.notify(&order, OrderEvent::HandoffCreated.as_str());
    info!(
        order_id = %order_id,
        handoff_id = %handoff.id,
        location = %handoff.location.address,
        "handoff created"
    );

    Ok(HandoffOutcome {
        handoff,
        segment,
        order,
    })
}

pub async fn create_shuttle(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    request: StopRequest,
) -> Result<ShuttleOutcome, AppError> {
    validate_stop(&request)?;
    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;
    state.policy.ensure_order_operator(actor, &order)?;

    ensure_pickup_done(state, order_id)?;
    status::guard_no_pending_handoff(order_id, state.pending_handoff_id(order_id))?;
    status::ensure_transition(&order, OrderEvent::ShuttleCreated)?;
    let driver_id = moving_driver(actor, &order)?;

    let segment = build_segment(
        state,
        &order,
        driver_id,
        SegmentKind::Shuttle,
        None,
        request.location,
        clean_notes(request.notes),
    )
    .await;

    ledger::append(state, segment.clone());
    status::apply(&mut order, OrderEvent::ShuttleCreated, &state.metrics)?;
    state.store_order(order.clone());

    state.metrics.handoffs_total.with_label_values(&["shuttle"]).inc();
    state.notify(&order, OrderEvent::ShuttleCreated.as_str());
    info!(
        order_id = %order_id,
        segment_id = %segment.id,
        location = %segment.end_location.address,
        "shuttle stop recorded"
    );

    Ok(ShuttleOutcome { segment, order })
}

pub async fn accept_handoff(
    state: &AppState,
    actor: &Actor,
    handoff_id: Uuid,
) -> Result<AcceptOutcome, AppError> {
    if actor.role != Role::Driver {
        return Err(AppError::Forbidden(
            "only drivers can accept a handoff".to_string(),
        ));
    }

    let order_id = state.handoff(handoff_id)?.order_id;
    let _guard = state.lock_order(order_id).await;
    let mut handoff = state.handoff(handoff_id)?;
    let mut order = state.order(order_id)?;
    state.policy.ensure_company(actor, order.company_id)?;

    let driver = state.driver(actor.user_id)?;
    if !driver.active || driver.company_id != order.company_id {
        return Err(AppError::Forbidden(format!(
            "driver {} cannot take over order {order_id}",
            driver.id
        )));
    }
    if !handoff.is_pending() {
        return Err(AppError::Conflict(format!(
            "handoff {handoff_id} is no longer pending"
        )));
    }
    status::guard_distinct_acceptor(handoff.created_by, driver.id)?;
    status::ensure_transition(&order, OrderEvent::HandoffAccepted)?;

    handoff.status = HandoffStatus::Accepted;
    handoff.accepted_by = Some(driver.id);
    handoff.accepted_at = Some(Utc::now());
    state.handoffs.insert(handoff.id, handoff.clone());
    state.release_pending_slot(order_id, handoff.id);

    order.assign(driver.id, driver.name.clone());
    status::apply(&mut order, OrderEvent::HandoffAccepted, &state.metrics)?;
    state.store_order(order.clone());

    state.metrics.handoffs_total.with_label_values(&["accepted"]).inc();
    state.notify(&order, OrderEvent::HandoffAccepted.as_str());
    info!(
        order_id = %order_id,
        handoff_id = %handoff_id,
        driver_id = %driver.id,
        "handoff accepted"
    );

    Ok(AcceptOutcome { handoff, order })
}

pub fn list_handoffs(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
) -> Result<Vec<OrderHandoff>, AppError> {
    let order = state.order(order_id)?;
    state.policy.ensure_company(actor, order.company_id)?;
    Ok(state.handoffs_for(order_id))
}

/// Vehicles waiting in the field for the caller's company.
pub fn list_pending_handoffs(state: &AppState, actor: &Actor) -> Vec<OrderHandoff> {
    let ids: Vec<Uuid> = state
        .pending_handoffs
        .iter()
        .map(|entry| *entry.value())
        .collect();
    let mut pending: Vec<OrderHandoff> = ids
        .into_iter()
        .filter_map(|id| state.handoff(id).ok())
        .filter(|handoff| handoff.company_id == actor.company_id)
        .collect();
    pending.sort_by_key(|handoff| handoff.created_at);
    pending
}
