//! Pickup/dropoff inspection protocols and the evidence gates on submission.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::engine::status::{self, OrderEvent};
use crate::error::AppError;
use crate::models::checklist::{Checklist, ChecklistContent, ChecklistKind, Damage};
use crate::models::order::TransportOrder;
use crate::state::AppState;

/// Photo slots every protocol must fill, in wizard order.
pub const REQUIRED_PHOTO_SLOTS: [&str; 9] = [
    "front",
    "rear",
    "left",
    "right",
    "dashboard",
    "odometer",
    "interior_front",
    "interior_rear",
    "trunk",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStep {
    Vehicle,
    Photos,
    Damages,
    Signatures,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    HasOdometer,
    HasAllRequiredPhotos,
    DamagesComplete,
    SignaturesComplete,
}

impl Predicate {
    pub fn step(self) -> ChecklistStep {
        match self {
            Predicate::HasOdometer => ChecklistStep::Vehicle,
            Predicate::HasAllRequiredPhotos => ChecklistStep::Photos,
            Predicate::DamagesComplete => ChecklistStep::Damages,
            Predicate::SignaturesComplete => ChecklistStep::Signatures,
        }
    }

    fn holds(self, content: &ChecklistContent) -> bool {
        match self {
            Predicate::HasOdometer => has_odometer(content),
            Predicate::HasAllRequiredPhotos => has_all_required_photos(content),
            Predicate::DamagesComplete => damages_complete(content),
            Predicate::SignaturesComplete => signatures_complete(content),
        }
    }

    fn message(self, content: &ChecklistContent) -> String {
        match self {
            Predicate::HasOdometer => "enter the odometer reading as a number".to_string(),
            Predicate::HasAllRequiredPhotos => {
                format!("missing photos: {}", missing_photo_slots(content).join(", "))
            }
            Predicate::DamagesComplete => {
                let position = content
                    .damages
                    .iter()
                    .position(|damage| !damage_complete(damage))
                    .map(|index| index + 1)
                    .unwrap_or_default();
                format!(
                    "damage #{position} needs location, type, description and a photo"
                )
            }
            Predicate::SignaturesComplete => {
                if is_blank(&content.driver_signature_url) {
                    "the driver signature is missing".to_string()
                } else {
                    "the customer must sign with their name, or the refusal must name who refused and why"
                        .to_string()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[error("{message}")]
pub struct ChecklistViolation {
    pub predicate: Predicate,
    pub step: ChecklistStep,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StepStatus {
    pub step: ChecklistStep,
    pub complete: bool,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|raw| raw.trim().is_empty())
}

pub fn predicates_for(kind: ChecklistKind) -> &'static [Predicate] {
    match kind {
        ChecklistKind::Pickup => &[
            Predicate::HasOdometer,
            Predicate::HasAllRequiredPhotos,
            Predicate::DamagesComplete,
            Predicate::SignaturesComplete,
        ],
        ChecklistKind::Dropoff => &[
            Predicate::HasOdometer,
            Predicate::HasAllRequiredPhotos,
            Predicate::SignaturesComplete,
        ],
    }
}

pub fn has_odometer(content: &ChecklistContent) -> bool {
    content
        .odometer
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse::<f64>().ok())
        .is_some_and(|km| km.is_finite() && km >= 0.0)
}

pub fn missing_photo_slots(content: &ChecklistContent) -> Vec<&'static str> {
    REQUIRED_PHOTO_SLOTS
        .iter()
        .copied()
        .filter(|slot| {
            !content
                .photos
                .iter()
                .any(|photo| photo.slot == *slot && !photo.url.trim().is_empty())
        })
        .collect()
}

pub fn has_all_required_photos(content: &ChecklistContent) -> bool {
    missing_photo_slots(content).is_empty()
}

fn damage_complete(damage: &Damage) -> bool {
    !damage.location.trim().is_empty()
        && !damage.damage_type.trim().is_empty()
        && !damage.description.trim().is_empty()
        && !is_blank(&damage.photo_url)
}

pub fn damages_complete(content: &ChecklistContent) -> bool {
    content.damages.iter().all(damage_complete)
}

pub fn signatures_complete(content: &ChecklistContent) -> bool {
    if is_blank(&content.driver_signature_url) {
        return false;
    }

    let customer_signed =
        !is_blank(&content.customer_signature_url) && !is_blank(&content.customer_name);
    let refusal_recorded = content.refusal.as_ref().is_some_and(|refusal| {
        !refusal.refuser_name.trim().is_empty() && !refusal.reason.trim().is_empty()
    });

    customer_signed || refusal_recorded
}

/// Reports the first failing predicate for the protocol type.
pub fn validate(content: &ChecklistContent, kind: ChecklistKind) -> Result<(), ChecklistViolation> {
    match predicates_for(kind)
        .iter()
        .find(|predicate| !predicate.holds(content))
    {
        None => Ok(()),
        Some(predicate) => Err(ChecklistViolation {
            predicate: *predicate,
            step: predicate.step(),
            message: predicate.message(content),
        }),
    }
}

pub fn step_status(content: &ChecklistContent, kind: ChecklistKind) -> Vec<StepStatus> {
    predicates_for(kind)
        .iter()
        .map(|predicate| StepStatus {
            step: predicate.step(),
            complete: predicate.holds(content),
        })
        .collect()
}

pub fn ensure_editable(checklist: &Checklist) -> Result<(), AppError> {
    if checklist.completed {
        Err(AppError::Conflict(format!(
            "checklist_locked: {} protocol of order {} is already submitted",
            checklist.kind.as_str(),
            checklist.order_id
        )))
    } else {
        Ok(())
    }
}

/// Amounts must be finite and non-negative; a submitted protocol also rejects zero.
pub fn ensure_expense_amounts(content: &ChecklistContent, submitting: bool) -> Result<(), AppError> {
    for (index, expense) in content.expenses.iter().enumerate() {
        let amount = expense.amount;
        let floor_ok = if submitting { amount > 0.0 } else { amount >= 0.0 };
        if !amount.is_finite() || !floor_ok {
            return Err(AppError::BadRequest(format!(
                "expense #{} has invalid amount {amount}",
                index + 1
            )));
        }
    }
    Ok(())
}

fn ensure_author(checklist: &Checklist, actor: &Actor) -> Result<(), AppError> {
    if checklist.driver_id == actor.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only the driver who opened the protocol may edit it".to_string(),
        ))
    }
}

fn protocol_driver(actor: &Actor, order: &TransportOrder) -> Result<Uuid, AppError> {
    if actor.role == Role::Driver {
        return Ok(actor.user_id);
    }

    order.assigned_driver_id.ok_or_else(|| {
        AppError::Conflict(format!("order {} has no assigned driver", order.id))
    })
}

fn opened_event(kind: ChecklistKind) -> OrderEvent {
    match kind {
        ChecklistKind::Pickup => OrderEvent::PickupOpened,
        ChecklistKind::Dropoff => OrderEvent::DropoffOpened,
    }
}

fn submitted_event(kind: ChecklistKind) -> OrderEvent {
    match kind {
        ChecklistKind::Pickup => OrderEvent::PickupSubmitted,
        ChecklistKind::Dropoff => OrderEvent::DropoffSubmitted,
    }
}

fn new_checklist(order_id: Uuid, driver_id: Uuid, kind: ChecklistKind) -> Checklist {
    let now = Utc::now();
    Checklist {
        id: Uuid::new_v4(),
        order_id,
        driver_id,
        kind,
        content: ChecklistContent::default(),
        completed: false,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistOutcome {
    pub order: TransportOrder,
    pub checklist: Checklist,
}

/// Opens (or reopens for viewing) a protocol. Creating it moves the order forward.
pub async fn open_checklist(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    kind: ChecklistKind,
) -> Result<ChecklistOutcome, AppError> {
    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;
    state.policy.ensure_order_operator(actor, &order)?;

    if let Some(checklist) = state.checklist(order_id, kind) {
        return Ok(ChecklistOutcome { order, checklist });
    }

    let event = opened_event(kind);
    status::ensure_transition(&order, event)?;
    let checklist = new_checklist(order_id, protocol_driver(actor, &order)?, kind);

    status::apply(&mut order, event, &state.metrics)?;
    state.checklists.insert((order_id, kind), checklist.clone());
    state.store_order(order.clone());
    state.notify(&order, event.as_str());

    info!(order_id = %order_id, kind = kind.as_str(), "checklist opened");
    Ok(ChecklistOutcome { order, checklist })
}

pub fn get_checklist(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    kind: ChecklistKind,
) -> Result<Checklist, AppError> {
    let order = state.order(order_id)?;
    state.policy.ensure_company(actor, order.company_id)?;
    let checklist = state.checklist(order_id, kind).ok_or_else(|| {
        AppError::NotFound(format!("no {} protocol for order {order_id}", kind.as_str()))
    })?;

    if actor.role == Role::Driver
        && checklist.driver_id != actor.user_id
        && !state.policy.can_view_order(actor, &order)
    {
        return Err(AppError::Forbidden("not your protocol".to_string()));
    }

    Ok(checklist)
}

/// Persists an unsubmitted draft. Completed protocols are locked.
pub async fn save_draft(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    kind: ChecklistKind,
    content: ChecklistContent,
) -> Result<Checklist, AppError> {
    let _guard = state.lock_order(order_id).await;
    let order = state.order(order_id)?;
    state.policy.ensure_company(actor, order.company_id)?;

    let mut checklist = state.checklist(order_id, kind).ok_or_else(|| {
        AppError::NotFound(format!(
            "open the {} protocol of order {order_id} first",
            kind.as_str()
        ))
    })?;
    ensure_editable(&checklist)?;
    ensure_author(&checklist, actor)?;

    let content = content.normalized_for(kind);
    ensure_expense_amounts(&content, false)?;

    checklist.content = content;
    checklist.updated_at = Utc::now();
    state.checklists.insert((order_id, kind), checklist.clone());

    Ok(checklist)
}

/// Validates and completes a protocol, advancing the order in the same step.
pub async fn submit_checklist(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    kind: ChecklistKind,
    content: ChecklistContent,
) -> Result<ChecklistOutcome, AppError> {
    let _guard = state.lock_order(order_id).await;
    let mut order = state.order(order_id)?;

    let mut checklist = match state.checklist(order_id, kind) {
        Some(existing) => {
            state.policy.ensure_company(actor, order.company_id)?;
            existing
        }
        None => {
            state.policy.ensure_order_operator(actor, &order)?;
            new_checklist(order_id, protocol_driver(actor, &order)?, kind)
        }
    };
    ensure_editable(&checklist)?;
    ensure_author(&checklist, actor)?;

    let content = content.normalized_for(kind);
    ensure_expense_amounts(&content, true)?;
    if let Err(violation) = validate(&content, kind) {
        state
            .metrics
            .checklist_submissions_total
            .with_label_values(&[kind.as_str(), "rejected"])
            .inc();
        warn!(
            order_id = %order_id,
            kind = kind.as_str(),
            step = ?violation.step,
            "checklist submission rejected"
        );
        return Err(violation.into());
    }

    let event = submitted_event(kind);
    status::ensure_transition(&order, event)?;

    let now = Utc::now();
    checklist.content = content;
    checklist.completed = true;
    checklist.updated_at = now;
    checklist.completed_at = Some(now);

    status::apply(&mut order, event, &state.metrics)?;
    state.checklists.insert((order_id, kind), checklist.clone());
    state.store_order(order.clone());
    state
        .metrics
        .checklist_submissions_total
        .with_label_values(&[kind.as_str(), "accepted"])
        .inc();
    state.notify(&order, event.as_str());

    Ok(ChecklistOutcome { order, checklist })
}

#[cfg(test)]
mod tests {
    use super::{
        ChecklistStep, Predicate, REQUIRED_PHOTO_SLOTS, ensure_expense_amounts, has_odometer,
        signatures_complete, step_status, validate,
    };
    use crate::error::AppError;
    use crate::models::checklist::{
        ChecklistContent, ChecklistKind, Damage, Expense, ExpenseKind, Photo, SignatureRefusal,
    };

    fn complete_content() -> ChecklistContent {
        ChecklistContent {
            odometer: Some("48211".to_string()),
            photos: REQUIRED_PHOTO_SLOTS
                .iter()
                .map(|slot| Photo {
                    slot: slot.to_string(),
                    url: format!("https://files.example/{slot}.jpg"),
                })
                .collect(),
            driver_signature_url: Some("https://files.example/driver.png".to_string()),
            customer_signature_url: Some("https://files.example/customer.png".to_string()),
            customer_name: Some("Erika Mustermann".to_string()),
            ..ChecklistContent::default()
        }
    }

    #[test]
    fn complete_protocol_passes_both_types() {
        assert!(validate(&complete_content(), ChecklistKind::Pickup).is_ok());
        assert!(validate(&complete_content(), ChecklistKind::Dropoff).is_ok());
    }

    #[test]
    fn odometer_must_be_numeric() {
        let mut content = complete_content();
        for raw in ["", "  ", "abc", "-5", "NaN", "inf"] {
            content.odometer = Some(raw.to_string());
            assert!(!has_odometer(&content), "{raw:?}");
        }
        content.odometer = Some(" 1200.5 ".to_string());
        assert!(has_odometer(&content));
    }

    #[test]
    fn missing_photo_names_the_photo_step() {
        let mut content = complete_content();
        content.photos.retain(|photo| photo.slot != "trunk");

        let violation = validate(&content, ChecklistKind::Pickup).unwrap_err();
        assert_eq!(violation.predicate, Predicate::HasAllRequiredPhotos);
        assert_eq!(violation.step, ChecklistStep::Photos);
        assert!(violation.message.contains("trunk"));
    }

    #[test]
    fn photo_with_empty_url_does_not_count() {
        let mut content = complete_content();
        content.photos[0].url = " ".to_string();
        assert!(validate(&content, ChecklistKind::Dropoff).is_err());
    }

    #[test]
    fn incomplete_damage_blocks_pickup_only() {
        let mut content = complete_content();
        content.damages.push(Damage {
            location: "front_bumper".to_string(),
            damage_type: "scratch".to_string(),
            description: "10cm scratch".to_string(),
            severity: None,
            photo_url: None,
        });

        let violation = validate(&content, ChecklistKind::Pickup).unwrap_err();
        assert_eq!(violation.step, ChecklistStep::Damages);
        assert!(violation.message.contains("#1"));
        assert!(validate(&content, ChecklistKind::Dropoff).is_ok());
    }

    #[test]
    fn refusal_needs_name_and_reason() {
        let mut content = complete_content();
        content.customer_signature_url = None;
        content.refusal = Some(SignatureRefusal {
            refuser_name: "Max Mustermann".to_string(),
            reason: String::new(),
        });
        assert!(!signatures_complete(&content));

        content.refusal = Some(SignatureRefusal {
            refuser_name: "Max Mustermann".to_string(),
            reason: "not authorised to sign".to_string(),
        });
        assert!(signatures_complete(&content));
    }

    #[test]
    fn customer_signature_without_name_is_incomplete() {
        let mut content = complete_content();
        content.customer_name = Some("  ".to_string());
        let violation = validate(&content, ChecklistKind::Dropoff).unwrap_err();
        assert_eq!(violation.predicate, Predicate::SignaturesComplete);
    }

    #[test]
    fn driver_signature_is_always_required() {
        let mut content = complete_content();
        content.driver_signature_url = None;
        let violation = validate(&content, ChecklistKind::Pickup).unwrap_err();
        assert_eq!(violation.step, ChecklistStep::Signatures);
        assert!(violation.message.contains("driver"));
    }

    #[test]
    fn first_failing_predicate_wins() {
        let violation = validate(&ChecklistContent::default(), ChecklistKind::Pickup).unwrap_err();
        assert_eq!(violation.predicate, Predicate::HasOdometer);
        assert_eq!(violation.step, ChecklistStep::Vehicle);
    }

    #[test]
    fn step_status_tracks_progress() {
        let content = ChecklistContent {
            odometer: Some("100".to_string()),
            ..ChecklistContent::default()
        };

        let steps = step_status(&content, ChecklistKind::Pickup);
        assert_eq!(steps.len(), 4);
        assert!(steps[0].complete);
        assert!(!steps[1].complete);
        assert!(steps[2].complete);
        assert!(!steps[3].complete);

        assert_eq!(step_status(&content, ChecklistKind::Dropoff).len(), 3);
    }

    #[test]
    fn expense_amounts_must_be_positive_on_submit() {
        let with_amount = |amount: f64| ChecklistContent {
            expenses: vec![Expense {
                kind: ExpenseKind::Fuel,
                amount,
                note: None,
                receipt_url: None,
            }],
            ..ChecklistContent::default()
        };

        assert!(ensure_expense_amounts(&with_amount(42.5), true).is_ok());
        assert!(ensure_expense_amounts(&with_amount(0.0), false).is_ok());
        for amount in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let result = ensure_expense_amounts(&with_amount(amount), true);
            assert!(matches!(result, Err(AppError::BadRequest(_))), "{amount}");
        }
        assert!(ensure_expense_amounts(&with_amount(-0.5), false).is_err());
    }
}
