use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Handoff,
    Shuttle,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Handoff => "handoff",
            SegmentKind::Shuttle => "shuttle",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Pending,
    Approved,
}

/// One leg of a transport, recorded when custody changes or the driver stops en route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSegment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub handoff_id: Option<Uuid>,
    pub driver_id: Uuid,
    pub kind: SegmentKind,
    pub start_location: Location,
    pub end_location: Location,
    pub distance_km: Option<f64>,
    pub notes: Option<String>,
    pub price: Option<f64>,
    pub price_status: PriceStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderSegment {
    pub fn approved_price(&self) -> Option<f64> {
        match self.price_status {
            PriceStatus::Approved => self.price,
            PriceStatus::Pending => None,
        }
    }
}
