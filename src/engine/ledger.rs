//! Append-only route segment ledger and settlement pricing.

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::AppError;
use crate::models::handoff::{HandoffStatus, OrderHandoff};
use crate::models::location::Location;
use crate::models::order::TransportOrder;
use crate::models::segment::{OrderSegment, PriceStatus};
use crate::state::AppState;

/// Where the next leg starts: the last segment's end, else the last accepted
/// handoff, else the pickup stop.
pub fn chain_start(
    segments: &[OrderSegment],
    handoffs: &[OrderHandoff],
    pickup: Location,
) -> Location {
    if let Some(last) = segments.last() {
        return last.end_location.clone();
    }

    handoffs
        .iter()
        .filter(|handoff| handoff.status == HandoffStatus::Accepted)
        .max_by_key(|handoff| handoff.accepted_at)
        .map(|handoff| handoff.location.clone())
        .unwrap_or(pickup)
}

pub fn next_start(state: &AppState, order: &TransportOrder) -> Location {
    chain_start(
        &state.segments_for(order.id),
        &state.handoffs_for(order.id),
        order.pickup.location(),
    )
}

pub fn append(state: &AppState, segment: OrderSegment) {
    state.segment_index.insert(segment.id, segment.order_id);
    state
        .segments
        .entry(segment.order_id)
        .or_default()
        .push(segment);
}

pub fn latest(state: &AppState, order_id: Uuid) -> Option<OrderSegment> {
    state
        .segments
        .get(&order_id)
        .and_then(|entry| entry.value().last().cloned())
}

pub fn approved_cost(segments: &[OrderSegment]) -> f64 {
    segments.iter().filter_map(OrderSegment::approved_price).sum()
}

pub fn list_segments(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
) -> Result<Vec<OrderSegment>, AppError> {
    let order = state.order(order_id)?;
    state.policy.ensure_company(actor, order.company_id)?;
    Ok(state.segments_for(order_id))
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: f64,
}

/// Runs `update` on the segment in place, returning the updated copy.
fn update_segment<F>(state: &AppState, segment_id: Uuid, update: F) -> Result<OrderSegment, AppError>
where
    F: FnOnce(&mut OrderSegment) -> Result<(), AppError>,
{
    let order_id = state
        .segment_index
        .get(&segment_id)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("segment {segment_id} not found")))?;

    let mut ledger = state
        .segments
        .get_mut(&order_id)
        .ok_or_else(|| AppError::Internal(format!("ledger for order {order_id} missing")))?;
    let segment = ledger
        .iter_mut()
        .find(|segment| segment.id == segment_id)
        .ok_or_else(|| AppError::Internal(format!("segment {segment_id} not in its ledger")))?;

    update(segment)?;
    Ok(segment.clone())
}

fn segment_company(state: &AppState, segment_id: Uuid) -> Result<(Uuid, Uuid), AppError> {
    let order_id = state
        .segment_index
        .get(&segment_id)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("segment {segment_id} not found")))?;
    let order = state.order(order_id)?;
    Ok((order_id, order.company_id))
}

pub async fn price_segment(
    state: &AppState,
    actor: &Actor,
    segment_id: Uuid,
    price: f64,
) -> Result<OrderSegment, AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::BadRequest("price must be a non-negative amount".to_string()));
    }

    let (order_id, company_id) = segment_company(state, segment_id)?;
    state.policy.ensure_staff(actor, company_id)?;
    let _guard = state.lock_order(order_id).await;

    let segment = update_segment(state, segment_id, |segment| {
        if segment.price_status == PriceStatus::Approved {
            return Err(AppError::Conflict(format!(
                "segment {} price is already approved",
                segment.id
            )));
        }
        segment.price = Some(price);
        segment.price_status = PriceStatus::Pending;
        Ok(())
    })?;

    info!(segment_id = %segment_id, price, "segment priced");
    Ok(segment)
}

pub async fn approve_segment_price(
    state: &AppState,
    actor: &Actor,
    segment_id: Uuid,
) -> Result<OrderSegment, AppError> {
    let (order_id, company_id) = segment_company(state, segment_id)?;
    state.policy.ensure_admin(actor, company_id)?;
    let _guard = state.lock_order(order_id).await;

    let segment = update_segment(state, segment_id, |segment| {
        if segment.price_status == PriceStatus::Approved {
            return Err(AppError::Conflict(format!(
                "segment {} price is already approved",
                segment.id
            )));
        }
        if segment.price.is_none() {
            return Err(AppError::Conflict(format!(
                "segment {} has no price to approve",
                segment.id
            )));
        }
        segment.price_status = PriceStatus::Approved;
        Ok(())
    })?;

    info!(segment_id = %segment_id, "segment price approved");
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{approved_cost, chain_start};
    use crate::models::handoff::{HandoffStatus, OrderHandoff};
    use crate::models::location::Location;
    use crate::models::segment::{OrderSegment, PriceStatus, SegmentKind};

    fn segment(start: &str, end: &str, price: Option<f64>, status: PriceStatus) -> OrderSegment {
        OrderSegment {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            handoff_id: None,
            driver_id: Uuid::nil(),
            kind: SegmentKind::Shuttle,
            start_location: Location::new(start),
            end_location: Location::new(end),
            distance_km: None,
            notes: None,
            price,
            price_status: status,
            created_at: Utc::now(),
        }
    }

    fn handoff(place: &str, status: HandoffStatus, minutes_ago: i64) -> OrderHandoff {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        OrderHandoff {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            company_id: Uuid::nil(),
            created_by: Uuid::new_v4(),
            location: Location::new(place),
            notes: None,
            status,
            accepted_by: None,
            created_at: at,
            accepted_at: (status == HandoffStatus::Accepted).then_some(at),
        }
    }

    #[test]
    fn starts_at_pickup_without_history() {
        let start = chain_start(&[], &[], Location::new("Hamburg"));
        assert_eq!(start.address, "Hamburg");
    }

    #[test]
    fn latest_segment_end_wins() {
        let segments = vec![
            segment("Hamburg", "Berlin", None, PriceStatus::Pending),
            segment("Berlin", "Dresden", None, PriceStatus::Pending),
        ];
        let handoffs = vec![handoff("Potsdam", HandoffStatus::Accepted, 1)];
        let start = chain_start(&segments, &handoffs, Location::new("Hamburg"));
        assert_eq!(start.address, "Dresden");
    }

    #[test]
    fn most_recent_accepted_handoff_beats_pickup() {
        let handoffs = vec![
            handoff("Potsdam", HandoffStatus::Accepted, 30),
            handoff("Cottbus", HandoffStatus::Accepted, 5),
            handoff("Magdeburg", HandoffStatus::Pending, 1),
        ];
        let start = chain_start(&[], &handoffs, Location::new("Hamburg"));
        assert_eq!(start.address, "Cottbus");
    }

    #[test]
    fn only_approved_prices_count_as_cost() {
        let segments = vec![
            segment("a", "b", Some(120.0), PriceStatus::Approved),
            segment("b", "c", Some(80.0), PriceStatus::Pending),
            segment("c", "d", None, PriceStatus::Pending),
        ];
        assert!((approved_cost(&segments) - 120.0).abs() < 1e-9);
    }
}
