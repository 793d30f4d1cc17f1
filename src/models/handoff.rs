use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Accepted,
    /// The order was cancelled before anyone took the vehicle over.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandoff {
    pub id: Uuid,
    pub order_id: Uuid,
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub location: Location,
    pub notes: Option<String>,
    pub status: HandoffStatus,
    pub accepted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl OrderHandoff {
    pub fn is_pending(&self) -> bool {
        self.status == HandoffStatus::Pending
    }
}
