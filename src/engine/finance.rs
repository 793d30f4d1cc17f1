//! Cost and profit of completed orders.
//!
//! Revenue is the agreed driver price, cost is the sum of approved segment
//! prices. Fuel paid by the driver is a cash advance and stays out of profit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::ledger;
use crate::error::AppError;
use crate::models::checklist::{Checklist, ChecklistKind};
use crate::models::order::TransportOrder;
use crate::models::segment::OrderSegment;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderFinancials {
    pub order_id: Uuid,
    pub settled_on: NaiveDate,
    pub revenue: f64,
    pub driver_cost: f64,
    pub profit: f64,
    pub fuel_advance: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FinancialTotals {
    pub orders: usize,
    pub revenue: f64,
    pub driver_cost: f64,
    pub profit: f64,
    pub fuel_advance: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FinancialReport {
    pub company_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub orders: Vec<OrderFinancials>,
    pub totals: FinancialTotals,
}

fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Figures for one order, or `None` when it is not completed.
pub fn order_financials(
    order: &TransportOrder,
    segments: &[OrderSegment],
    checklists: &[Checklist],
) -> Option<OrderFinancials> {
    if !order.status.is_completed_family() {
        return None;
    }
    let settled_on = order.settlement_date()?;

    let revenue = order.driver_price.unwrap_or(0.0);
    let driver_cost = ledger::approved_cost(segments);
    let fuel_advance = checklists
        .iter()
        .filter(|checklist| checklist.order_id == order.id)
        .map(|checklist| checklist.content.fuel_expenses())
        .sum::<f64>();

    Some(OrderFinancials {
        order_id: order.id,
        settled_on,
        revenue: cents(revenue),
        driver_cost: cents(driver_cost),
        profit: cents(revenue - driver_cost),
        fuel_advance: cents(fuel_advance),
    })
}

pub fn summarize(rows: &[OrderFinancials]) -> FinancialTotals {
    let totals = rows.iter().fold(FinancialTotals::default(), |mut acc, row| {
        acc.orders += 1;
        acc.revenue += row.revenue;
        acc.driver_cost += row.driver_cost;
        acc.profit += row.profit;
        acc.fuel_advance += row.fuel_advance;
        acc
    });

    FinancialTotals {
        revenue: cents(totals.revenue),
        driver_cost: cents(totals.driver_cost),
        profit: cents(totals.profit),
        fuel_advance: cents(totals.fuel_advance),
        ..totals
    }
}

pub fn financial_report(
    state: &AppState,
    actor: &Actor,
    company_id: Uuid,
    query: ReportQuery,
) -> Result<FinancialReport, AppError> {
    state.policy.ensure_staff(actor, company_id)?;
    if query.from > query.to {
        return Err(AppError::BadRequest("from must not be after to".to_string()));
    }

    let orders: Vec<TransportOrder> = state
        .orders
        .iter()
        .filter(|entry| entry.value().company_id == company_id)
        .map(|entry| entry.value().clone())
        .collect();

    let mut rows: Vec<OrderFinancials> = orders
        .iter()
        .filter_map(|order| {
            let checklists: Vec<Checklist> = [ChecklistKind::Pickup, ChecklistKind::Dropoff]
                .into_iter()
                .filter_map(|kind| state.checklist(order.id, kind))
                .collect();
            order_financials(order, &state.segments_for(order.id), &checklists)
        })
        .filter(|row| row.settled_on >= query.from && row.settled_on <= query.to)
        .collect();
    rows.sort_by_key(|row| (row.settled_on, row.order_id));

    let totals = summarize(&rows);
    Ok(FinancialReport {
        company_id,
        from: query.from,
        to: query.to,
        orders: rows,
        totals,
    })
}
