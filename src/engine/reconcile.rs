//! Administrative repair of orders stuck `in_transit` without a valid custodian.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::ledger;
use crate::engine::status::{self, OrderEvent};
use crate::error::AppError;
use crate::models::handoff::OrderHandoff;
use crate::models::order::{OrderStatus, TransportOrder};
use crate::models::segment::{OrderSegment, SegmentKind};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StuckReason {
    NoDriver,
    HandoffLatest,
}

impl StuckReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StuckReason::NoDriver => "no_driver",
            StuckReason::HandoffLatest => "handoff_latest",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReasonCounts {
    pub no_driver: usize,
    pub handoff_latest: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub updated_count: usize,
    pub reasons: ReasonCounts,
    pub order_ids: Vec<Uuid>,
}

/// Why an order needs correcting, if it does.
///
/// A handoff segment only counts when its handoff was never accepted; an
/// accepted handoff followed by normal driving is a healthy `in_transit` order.
pub fn diagnose(
    order: &TransportOrder,
    latest_segment: Option<&OrderSegment>,
    handoff_of_latest: Option<&OrderHandoff>,
) -> Option<StuckReason> {
    if order.status != OrderStatus::InTransit {
        return None;
    }
    if order.assigned_driver_id.is_none() {
        return Some(StuckReason::NoDriver);
    }

    let latest = latest_segment?;
    if latest.kind != SegmentKind::Handoff {
        return None;
    }
    match handoff_of_latest {
        Some(handoff) if !handoff.is_pending() => None,
        _ => Some(StuckReason::HandoffLatest),
    }
}

/// Idempotent: corrected orders leave `in_transit`, so a rerun finds nothing.
pub async fn reconcile_stuck_orders(
    state: &AppState,
    actor: &Actor,
    company_id: Uuid,
) -> Result<ReconcileReport, AppError> {
    state.policy.ensure_admin(actor, company_id)?;

    let candidates: Vec<Uuid> = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.company_id == company_id && order.status == OrderStatus::InTransit
        })
        .map(|entry| *entry.key())
        .collect();

    let mut report = ReconcileReport::default();
    for order_id in candidates {
        let _guard = state.lock_order(order_id).await;
        let mut order = state.order(order_id)?;

        let latest = ledger::latest(state, order_id);
        let handoff = latest
            .as_ref()
            .and_then(|segment| segment.handoff_id)
            .and_then(|handoff_id| state.handoff(handoff_id).ok());
        let Some(reason) = diagnose(&order, latest.as_ref(), handoff.as_ref()) else {
            continue;
        };

        order.clear_assignment();
        status::apply(&mut order, OrderEvent::StuckCorrected, &state.metrics)?;
        if let Some(held) = state.pending_handoff_id(order_id) {
            // A slot naming a handoff that is gone or settled would block reassignment.
            if !state.handoff(held).is_ok_and(|handoff| handoff.is_pending()) {
                state.release_pending_slot(order_id, held);
            }
        }
        state.store_order(order.clone());
        state.notify(&order, OrderEvent::StuckCorrected.as_str());

        match reason {
            StuckReason::NoDriver => report.reasons.no_driver += 1,
            StuckReason::HandoffLatest => report.reasons.handoff_latest += 1,
        }
        report.updated_count += 1;
        report.order_ids.push(order_id);
        state
            .metrics
            .reconciliation_corrections_total
            .with_label_values(&[reason.as_str()])
            .inc();
        warn!(order_id = %order_id, reason = reason.as_str(), "stuck order corrected");
    }

    info!(
        company_id = %company_id,
        updated = report.updated_count,
        no_driver = report.reasons.no_driver,
        handoff_latest = report.reasons.handoff_latest,
        "reconciliation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{StuckReason, diagnose};
    use crate::models::handoff::{HandoffStatus, OrderHandoff};
    use crate::models::location::Location;
    use crate::models::order::{OrderStatus, Stop, TransportOrder};
    use crate::models::segment::{OrderSegment, PriceStatus, SegmentKind};

    fn stop(city: &str) -> Stop {
        Stop {
            address: String::new(),
            city: city.to_string(),
            postal_code: String::new(),
            date: None,
            time: None,
            point: None,
        }
    }

    fn order(status: OrderStatus, driver: Option<Uuid>) -> TransportOrder {
        TransportOrder {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            status,
            pickup: stop("Hamburg"),
            dropoff: stop("München"),
            vehicle: None,
            assigned_driver_id: driver,
            assigned_driver_name: driver.map(|_| "Driver".to_string()),
            distance_km: None,
            driver_price: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    fn segment(kind: SegmentKind, handoff_id: Option<Uuid>) -> OrderSegment {
        OrderSegment {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            handoff_id,
            driver_id: Uuid::new_v4(),
            kind,
            start_location: Location::new("Hamburg"),
            end_location: Location::new("Berlin"),
            distance_km: None,
            notes: None,
            price: None,
            price_status: PriceStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn handoff(status: HandoffStatus) -> OrderHandoff {
        OrderHandoff {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            company_id: Uuid::nil(),
            created_by: Uuid::new_v4(),
            location: Location::new("Berlin"),
            notes: None,
            status,
            accepted_by: None,
            created_at: Utc::now(),
            accepted_at: None,
        }
    }

    #[test]
    fn unassigned_in_transit_is_no_driver() {
        let order = order(OrderStatus::InTransit, None);
        assert_eq!(diagnose(&order, None, None), Some(StuckReason::NoDriver));
    }

    #[test]
    fn other_statuses_are_ignored() {
        let order = order(OrderStatus::Zwischenabgabe, None);
        assert_eq!(diagnose(&order, None, None), None);
    }

    #[test]
    fn unaccepted_handoff_as_latest_segment_is_stuck() {
        let order = order(OrderStatus::InTransit, Some(Uuid::new_v4()));
        let pending = handoff(HandoffStatus::Pending);
        let latest = segment(SegmentKind::Handoff, Some(pending.id));
        assert_eq!(
            diagnose(&order, Some(&latest), Some(&pending)),
            Some(StuckReason::HandoffLatest)
        );
        assert_eq!(
            diagnose(&order, Some(&latest), None),
            Some(StuckReason::HandoffLatest)
        );
    }

    #[test]
    fn accepted_handoff_as_latest_segment_is_healthy() {
        let order = order(OrderStatus::InTransit, Some(Uuid::new_v4()));
        let accepted = handoff(HandoffStatus::Accepted);
        let latest = segment(SegmentKind::Handoff, Some(accepted.id));
        assert_eq!(diagnose(&order, Some(&latest), Some(&accepted)), None);
    }

    #[test]
    fn shuttle_as_latest_segment_is_healthy() {
        let order = order(OrderStatus::InTransit, Some(Uuid::new_v4()));
        let latest = segment(SegmentKind::Shuttle, None);
        assert_eq!(diagnose(&order, Some(&latest), None), None);
    }
}
