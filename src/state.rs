use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use uuid::Uuid;

use crate::auth::AccessPolicy;
use crate::error::AppError;
use crate::geo::resolver::DistanceResolver;
use crate::models::checklist::{Checklist, ChecklistKind};
use crate::models::driver::Driver;
use crate::models::handoff::OrderHandoff;
use crate::models::order::{OrderStatus, TransportOrder};
use crate::models::segment::OrderSegment;
use crate::observability::metrics::Metrics;

pub const DEFAULT_DISTANCE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
pub struct OrderNotification {
    pub order_id: Uuid,
    pub company_id: Uuid,
    pub kind: &'static str,
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

pub struct AppState {
    pub drivers: DashMap<Uuid, Driver>,
    pub orders: DashMap<Uuid, TransportOrder>,
    pub checklists: DashMap<(Uuid, ChecklistKind), Checklist>,
    pub handoffs: DashMap<Uuid, OrderHandoff>,
    /// Order id -> id of its one pending handoff.
    pub pending_handoffs: DashMap<Uuid, Uuid>,
    /// Order id -> segments in creation order.
    pub segments: DashMap<Uuid, Vec<OrderSegment>>,
    /// Segment id -> owning order id.
    pub segment_index: DashMap<Uuid, Uuid>,
    /// One lock per order for the life of the store. Orders are never deleted, and
    /// dropping an entry while a task still holds its `Arc` would hand the next caller a
    /// second, unrelated mutex.
    order_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    pub events_tx: broadcast::Sender<OrderNotification>,
    pub resolver: Arc<dyn DistanceResolver>,
    pub policy: AccessPolicy,
    pub distance_timeout: Duration,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        event_buffer_size: usize,
        resolver: Arc<dyn DistanceResolver>,
        policy: AccessPolicy,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            drivers: DashMap::new(),
            orders: DashMap::new(),
            checklists: DashMap::new(),
            handoffs: DashMap::new(),
            pending_handoffs: DashMap::new(),
            segments: DashMap::new(),
            segment_index: DashMap::new(),
            order_locks: DashMap::new(),
            events_tx,
            resolver,
            policy,
            distance_timeout: DEFAULT_DISTANCE_TIMEOUT,
            metrics: Metrics::new(),
        }
    }

    pub fn with_distance_timeout(mut self, timeout: Duration) -> Self {
        self.distance_timeout = timeout;
        self
    }

    /// Serializes mutations of one order. Held for the whole operation.
    pub async fn lock_order(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.order_locks.entry(order_id).or_default().clone();
        lock.lock_owned().await
    }

    pub fn order(&self, order_id: Uuid) -> Result<TransportOrder, AppError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }

    pub fn driver(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&driver_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
    }

    pub fn handoff(&self, handoff_id: Uuid) -> Result<OrderHandoff, AppError> {
        self.handoffs
            .get(&handoff_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("handoff {handoff_id} not found")))
    }

    pub fn checklist(&self, order_id: Uuid, kind: ChecklistKind) -> Option<Checklist> {
        self.checklists
            .get(&(order_id, kind))
            .map(|entry| entry.value().clone())
    }

    pub fn pending_handoff_id(&self, order_id: Uuid) -> Option<Uuid> {
        self.pending_handoffs.get(&order_id).map(|entry| *entry.value())
    }

    /// Claims the order's pending-handoff slot; fails if another handoff holds it.
    pub fn claim_pending_slot(&self, order_id: Uuid, handoff_id: Uuid) -> Result<(), AppError> {
        match self.pending_handoffs.entry(order_id) {
            Entry::Occupied(existing) => Err(AppError::Conflict(format!(
                "order {order_id} already has pending handoff {}",
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(handoff_id);
                Ok(())
            }
        }
    }

    pub fn release_pending_slot(&self, order_id: Uuid, handoff_id: Uuid) {
        self.pending_handoffs
            .remove_if(&order_id, |_, held| *held == handoff_id);
    }

    pub fn segments_for(&self, order_id: Uuid) -> Vec<OrderSegment> {
        self.segments
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn handoffs_for(&self, order_id: Uuid) -> Vec<OrderHandoff> {
        let mut handoffs: Vec<OrderHandoff> = self
            .handoffs
            .iter()
            .filter(|entry| entry.value().order_id == order_id)
            .map(|entry| entry.value().clone())
            .collect();
        handoffs.sort_by_key(|handoff| handoff.created_at);
        handoffs
    }

    pub fn store_order(&self, order: TransportOrder) {
        self.orders.insert(order.id, order);
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub fn notify(&self, order: &TransportOrder, kind: &'static str) {
        let _ = self.events_tx.send(OrderNotification {
            order_id: order.id,
            company_id: order.company_id,
            kind,
            status: order.status,
            at: Utc::now(),
        });
    }
}
