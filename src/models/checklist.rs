use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKind {
    Pickup,
    Dropoff,
}

impl ChecklistKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChecklistKind::Pickup => "pickup",
            ChecklistKind::Dropoff => "dropoff",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Damage {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub damage_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub slot: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Accessory {
    pub name: String,
    pub present: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    Fuel,
    Toll,
    Parking,
    PublicTransport,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub kind: ExpenseKind,
    pub amount: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

/// Customer declined to sign; who refused and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SignatureRefusal {
    #[serde(default)]
    pub refuser_name: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cleanliness {
    Clean,
    Normal,
    Dirty,
}

/// The driver-editable body of an inspection protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChecklistContent {
    #[serde(default)]
    pub odometer: Option<String>,
    /// Eighths of a tank.
    #[serde(default)]
    pub fuel_level: Option<u8>,
    #[serde(default)]
    pub exterior_cleanliness: Option<Cleanliness>,
    #[serde(default)]
    pub interior_cleanliness: Option<Cleanliness>,
    #[serde(default)]
    pub accessories: Vec<Accessory>,
    #[serde(default)]
    pub damages: Vec<Damage>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub driver_signature_url: Option<String>,
    #[serde(default)]
    pub customer_signature_url: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub refusal: Option<SignatureRefusal>,
}

impl ChecklistContent {
    /// Drops fields that do not belong to the given protocol type.
    pub fn normalized_for(mut self, kind: ChecklistKind) -> Self {
        match kind {
            ChecklistKind::Pickup => self.expenses.clear(),
            ChecklistKind::Dropoff => {
                self.accessories.clear();
                self.damages.clear();
            }
        }
        self
    }

    pub fn fuel_expenses(&self) -> f64 {
        self.expenses
            .iter()
            .filter(|expense| expense.kind == ExpenseKind::Fuel)
            .map(|expense| expense.amount)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checklist {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub kind: ChecklistKind,
    #[serde(flatten)]
    pub content: ChecklistContent,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::{ChecklistContent, ChecklistKind, Damage, Expense, ExpenseKind};

    fn expense(kind: ExpenseKind, amount: f64) -> Expense {
        Expense {
            kind,
            amount,
            note: None,
            receipt_url: None,
        }
    }

    #[test]
    fn dropoff_normalization_drops_damages() {
        let content = ChecklistContent {
            damages: vec![Damage::default()],
            expenses: vec![expense(ExpenseKind::Toll, 12.0)],
            ..ChecklistContent::default()
        }
        .normalized_for(ChecklistKind::Dropoff);

        assert!(content.damages.is_empty());
        assert_eq!(content.expenses.len(), 1);
    }

    #[test]
    fn pickup_normalization_drops_expenses() {
        let content = ChecklistContent {
            expenses: vec![expense(ExpenseKind::Fuel, 40.0)],
            ..ChecklistContent::default()
        }
        .normalized_for(ChecklistKind::Pickup);

        assert!(content.expenses.is_empty());
    }

    #[test]
    fn fuel_expenses_ignore_other_kinds() {
        let content = ChecklistContent {
            expenses: vec![
                expense(ExpenseKind::Fuel, 40.0),
                expense(ExpenseKind::Parking, 5.0),
                expense(ExpenseKind::Fuel, 10.5),
            ],
            ..ChecklistContent::default()
        };

        assert!((content.fuel_expenses() - 50.5).abs() < 1e-9);
    }
}
