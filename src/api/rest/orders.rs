use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::ledger;
use crate::engine::orders::{self, BillingRequest, CreateOrderRequest};
use crate::error::AppError;
use crate::models::order::{OrderStatus, TransportOrder};
use crate::models::segment::OrderSegment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/assign", post(assign_driver))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/billing", post(advance_billing))
        .route("/orders/:id/segments", get(list_segments))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<TransportOrder>, AppError> {
    Ok(Json(orders::create_order(&state, &actor, payload).await?))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<TransportOrder>> {
    Json(orders::list_orders(&state, &actor, query.status))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<TransportOrder>, AppError> {
    Ok(Json(orders::get_order(&state, &actor, id)?))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<TransportOrder>, AppError> {
    Ok(Json(
        orders::assign_driver(&state, &actor, id, payload.driver_id).await?,
    ))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<TransportOrder>, AppError> {
    Ok(Json(orders::cancel_order(&state, &actor, id).await?))
}

async fn advance_billing(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<BillingRequest>,
) -> Result<Json<TransportOrder>, AppError> {
    Ok(Json(
        orders::advance_billing(&state, &actor, id, payload.event).await?,
    ))
}

async fn list_segments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderSegment>>, AppError> {
    Ok(Json(ledger::list_segments(&state, &actor, id)?))
}
