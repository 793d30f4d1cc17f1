use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::finance::{self, FinancialReport, ReportQuery};
use crate::engine::ledger::{self, PriceRequest};
use crate::engine::reconcile::{self, ReconcileReport};
use crate::error::AppError;
use crate::models::segment::OrderSegment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/segments/:id/price", post(price_segment))
        .route("/segments/:id/approve", post(approve_segment))
        .route("/companies/:id/reconcile", post(reconcile_company))
        .route("/companies/:id/report", get(company_report))
}

async fn price_segment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<PriceRequest>,
) -> Result<Json<OrderSegment>, AppError> {
    Ok(Json(
        ledger::price_segment(&state, &actor, id, payload.price).await?,
    ))
}

async fn approve_segment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderSegment>, AppError> {
    Ok(Json(ledger::approve_segment_price(&state, &actor, id).await?))
}

async fn reconcile_company(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconcileReport>, AppError> {
    Ok(Json(reconcile::reconcile_stuck_orders(&state, &actor, id).await?))
}

async fn company_report(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<FinancialReport>, AppError> {
    Ok(Json(finance::financial_report(&state, &actor, id, query)?))
}
