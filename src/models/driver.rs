use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
