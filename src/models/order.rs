use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::{GeoPoint, Location};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Assigned,
    PickupStarted,
    InTransit,
    Zwischenabgabe,
    DeliveryStarted,
    Completed,
    Cancelled,
    Review,
    ReadyForBilling,
    Approved,
}

impl OrderStatus {
    /// Completed orders and the billing sub-states that follow them.
    pub fn is_completed_family(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Review
                | OrderStatus::ReadyForBilling
                | OrderStatus::Approved
        )
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Cancelled || self.is_completed_family()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickupStarted => "pickup_started",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Zwischenabgabe => "zwischenabgabe",
            OrderStatus::DeliveryStarted => "delivery_started",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Review => "review",
            OrderStatus::ReadyForBilling => "ready_for_billing",
            OrderStatus::Approved => "approved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub point: Option<GeoPoint>,
}

impl Stop {
    pub fn location(&self) -> Location {
        let mut text = self.address.trim().to_string();
        let locality = format!("{} {}", self.postal_code.trim(), self.city.trim());
        let locality = locality.trim();
        if !locality.is_empty() {
            if !text.is_empty() {
                text.push_str(", ");
            }
            text.push_str(locality);
        }

        Location {
            address: text,
            point: self.point,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub vin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportOrder {
    pub id: Uuid,
    pub company_id: Uuid,
    pub status: OrderStatus,
    pub pickup: Stop,
    pub dropoff: Stop,
    pub vehicle: Option<Vehicle>,
    pub assigned_driver_id: Option<Uuid>,
    pub assigned_driver_name: Option<String>,
    pub distance_km: Option<f64>,
    pub driver_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransportOrder {
    pub fn assign(&mut self, driver_id: Uuid, driver_name: String) {
        self.assigned_driver_id = Some(driver_id);
        self.assigned_driver_name = Some(driver_name);
    }

    pub fn clear_assignment(&mut self) {
        self.assigned_driver_id = None;
        self.assigned_driver_name = None;
    }

    pub fn is_assigned_to(&self, driver_id: Uuid) -> bool {
        self.assigned_driver_id == Some(driver_id)
    }

    /// Day the order counts toward in financial reports.
    pub fn settlement_date(&self) -> Option<NaiveDate> {
        self.completed_at
            .map(|at| at.date_naive())
            .or(self.dropoff.date)
    }
}

#[cfg(test)]
mod tests {
    use super::{OrderStatus, Stop};

    fn stop(address: &str, postal: &str, city: &str) -> Stop {
        Stop {
            address: address.to_string(),
            city: city.to_string(),
            postal_code: postal.to_string(),
            date: None,
            time: None,
            point: None,
        }
    }

    #[test]
    fn stop_location_joins_address_and_locality() {
        let location = stop("Invalidenstr. 10", "10115", "Berlin").location();
        assert_eq!(location.address, "Invalidenstr. 10, 10115 Berlin");
    }

    #[test]
    fn stop_location_without_street_uses_locality_only() {
        let location = stop("", "01067", "Dresden").location();
        assert_eq!(location.address, "01067 Dresden");
    }

    #[test]
    fn billing_states_belong_to_completed_family() {
        assert!(OrderStatus::Review.is_completed_family());
        assert!(OrderStatus::Approved.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Cancelled.is_completed_family());
        assert!(!OrderStatus::Zwischenabgabe.is_terminal());
    }
}
