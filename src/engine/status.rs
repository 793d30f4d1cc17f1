//! Order status transition table.
//!
//! Every status change goes through [`apply`]. A `(status, event)` pair missing
//! from [`next_status`] is a conflict and leaves the order untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{OrderStatus, TransportOrder};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    DriverAssigned,
    PickupOpened,
    PickupSubmitted,
    HandoffCreated,
    ShuttleCreated,
    HandoffAccepted,
    DropoffOpened,
    DropoffSubmitted,
    StuckCorrected,
    Cancelled,
    SentToReview,
    MarkedReadyForBilling,
    BillingApproved,
}

impl OrderEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderEvent::DriverAssigned => "driver_assigned",
            OrderEvent::PickupOpened => "pickup_opened",
            OrderEvent::PickupSubmitted => "pickup_submitted",
            OrderEvent::HandoffCreated => "handoff_created",
            OrderEvent::ShuttleCreated => "shuttle_created",
            OrderEvent::HandoffAccepted => "handoff_accepted",
            OrderEvent::DropoffOpened => "dropoff_opened",
            OrderEvent::DropoffSubmitted => "dropoff_submitted",
            OrderEvent::StuckCorrected => "stuck_corrected",
            OrderEvent::Cancelled => "cancelled",
            OrderEvent::SentToReview => "sent_to_review",
            OrderEvent::MarkedReadyForBilling => "marked_ready_for_billing",
            OrderEvent::BillingApproved => "billing_approved",
        }
    }
}

pub fn next_status(from: OrderStatus, event: OrderEvent) -> Option<OrderStatus> {
    use OrderEvent as E;
    use OrderStatus as S;

    let to = match (event, from) {
        (E::DriverAssigned, S::New | S::Assigned) => S::Assigned,
        (E::DriverAssigned, S::Zwischenabgabe) => S::InTransit,
        (E::PickupOpened, S::New | S::Assigned | S::PickupStarted) => S::PickupStarted,
        (E::PickupSubmitted, S::New | S::Assigned | S::PickupStarted) => S::InTransit,
        (E::HandoffCreated, S::InTransit) => S::Zwischenabgabe,
        (E::ShuttleCreated, S::InTransit) => S::InTransit,
        (E::HandoffAccepted, S::Zwischenabgabe) => S::InTransit,
        (
            E::DropoffOpened,
            S::New | S::Assigned | S::PickupStarted | S::InTransit | S::DeliveryStarted,
        ) => S::DeliveryStarted,
        (
            E::DropoffSubmitted,
            S::New | S::Assigned | S::PickupStarted | S::InTransit | S::DeliveryStarted,
        ) => S::Completed,
        (E::StuckCorrected, S::InTransit) => S::Zwischenabgabe,
        (E::Cancelled, status) if !status.is_terminal() => S::Cancelled,
        (E::SentToReview, S::Completed) => S::Review,
        (E::MarkedReadyForBilling, S::Completed | S::Review) => S::ReadyForBilling,
        (E::BillingApproved, S::ReadyForBilling) => S::Approved,
        _ => return None,
    };

    Some(to)
}

/// Checks the table without mutating. Used to reject before any write.
pub fn ensure_transition(order: &TransportOrder, event: OrderEvent) -> Result<OrderStatus, AppError> {
    next_status(order.status, event).ok_or_else(|| {
        AppError::Conflict(format!(
            "order {} cannot go through {} while {}",
            order.id,
            event.as_str(),
            order.status.as_str()
        ))
    })
}

/// Moves the order to its next status and stamps timestamps.
pub fn apply(
    order: &mut TransportOrder,
    event: OrderEvent,
    metrics: &Metrics,
) -> Result<OrderStatus, AppError> {
    let to = ensure_transition(order, event)?;
    let from = order.status;
    let now = Utc::now();

    order.status = to;
    order.updated_at = now;
    if event == OrderEvent::DropoffSubmitted {
        order.completed_at = Some(now);
    }

    metrics
        .order_transitions_total
        .with_label_values(&[event.as_str()])
        .inc();
    info!(
        order_id = %order.id,
        from = from.as_str(),
        to = to.as_str(),
        event = event.as_str(),
        "order transitioned"
    );

    Ok(to)
}

pub fn guard_no_pending_handoff(order_id: Uuid, pending: Option<Uuid>) -> Result<(), AppError> {
    match pending {
        None => Ok(()),
        Some(handoff_id) => Err(AppError::Conflict(format!(
            "order {order_id} already has pending handoff {handoff_id}"
        ))),
    }
}

pub fn guard_distinct_acceptor(creator: Uuid, acceptor: Uuid) -> Result<(), AppError> {
    if creator == acceptor {
        Err(AppError::Conflict(
            "a handoff must be accepted by a different driver".to_string(),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{OrderEvent, guard_distinct_acceptor, guard_no_pending_handoff, next_status};
    use crate::models::order::OrderStatus;

    const ALL_STATUSES: [OrderStatus; 11] = [
        OrderStatus::New,
        OrderStatus::Assigned,
        OrderStatus::PickupStarted,
        OrderStatus::InTransit,
        OrderStatus::Zwischenabgabe,
        OrderStatus::DeliveryStarted,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Review,
        OrderStatus::ReadyForBilling,
        OrderStatus::Approved,
    ];

    #[test]
    fn happy_path_reaches_completed() {
        let mut status = OrderStatus::New;
        for event in [
            OrderEvent::DriverAssigned,
            OrderEvent::PickupOpened,
            OrderEvent::PickupSubmitted,
            OrderEvent::HandoffCreated,
            OrderEvent::HandoffAccepted,
            OrderEvent::ShuttleCreated,
            OrderEvent::DropoffOpened,
            OrderEvent::DropoffSubmitted,
        ] {
            status = next_status(status, event).unwrap();
        }
        assert_eq!(status, OrderStatus::Completed);
    }

    #[test]
    fn handoff_requires_in_transit() {
        assert_eq!(
            next_status(OrderStatus::PickupStarted, OrderEvent::HandoffCreated),
            None
        );
        assert_eq!(
            next_status(OrderStatus::Zwischenabgabe, OrderEvent::HandoffCreated),
            None
        );
    }

    #[test]
    fn dropoff_cannot_start_while_vehicle_is_unowned() {
        assert_eq!(
            next_status(OrderStatus::Zwischenabgabe, OrderEvent::DropoffOpened),
            None
        );
        assert_eq!(
            next_status(OrderStatus::Zwischenabgabe, OrderEvent::DropoffSubmitted),
            None
        );
    }

    #[test]
    fn shuttle_keeps_in_transit() {
        assert_eq!(
            next_status(OrderStatus::InTransit, OrderEvent::ShuttleCreated),
            Some(OrderStatus::InTransit)
        );
    }

    #[test]
    fn cancel_only_from_non_terminal_states() {
        for status in ALL_STATUSES {
            let result = next_status(status, OrderEvent::Cancelled);
            if status.is_terminal() {
                assert_eq!(result, None, "{status:?}");
            } else {
                assert_eq!(result, Some(OrderStatus::Cancelled), "{status:?}");
            }
        }
    }

    #[test]
    fn terminal_states_accept_no_driver_events() {
        for status in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for event in [
                OrderEvent::PickupOpened,
                OrderEvent::PickupSubmitted,
                OrderEvent::HandoffCreated,
                OrderEvent::ShuttleCreated,
                OrderEvent::HandoffAccepted,
                OrderEvent::DropoffOpened,
                OrderEvent::DropoffSubmitted,
            ] {
                assert_eq!(next_status(status, event), None, "{status:?} {event:?}");
            }
        }
    }

    #[test]
    fn billing_sub_states_follow_completion() {
        assert_eq!(
            next_status(OrderStatus::Completed, OrderEvent::SentToReview),
            Some(OrderStatus::Review)
        );
        assert_eq!(
            next_status(OrderStatus::Review, OrderEvent::MarkedReadyForBilling),
            Some(OrderStatus::ReadyForBilling)
        );
        assert_eq!(
            next_status(OrderStatus::ReadyForBilling, OrderEvent::BillingApproved),
            Some(OrderStatus::Approved)
        );
        assert_eq!(
            next_status(OrderStatus::InTransit, OrderEvent::BillingApproved),
            None
        );
    }

    #[test]
    fn dispatch_can_reassign_a_parked_vehicle() {
        assert_eq!(
            next_status(OrderStatus::Zwischenabgabe, OrderEvent::DriverAssigned),
            Some(OrderStatus::InTransit)
        );
        for status in [OrderStatus::PickupStarted, OrderStatus::InTransit, OrderStatus::Completed] {
            assert_eq!(next_status(status, OrderEvent::DriverAssigned), None, "{status:?}");
        }
    }

    #[test]
    fn same_driver_cannot_accept_own_handoff() {
        let driver = Uuid::new_v4();
        assert!(guard_distinct_acceptor(driver, driver).is_err());
        assert!(guard_distinct_acceptor(driver, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn pending_handoff_blocks() {
        let order = Uuid::new_v4();
        assert!(guard_no_pending_handoff(order, None).is_ok());
        assert!(guard_no_pending_handoff(order, Some(Uuid::new_v4())).is_err());
    }
}
