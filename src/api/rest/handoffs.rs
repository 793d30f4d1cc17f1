use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::handoff::{
    self, AcceptOutcome, HandoffOutcome, ShuttleOutcome, StopRequest,
};
use crate::error::AppError;
use crate::models::handoff::OrderHandoff;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/handoffs", post(create_handoff).get(list_handoffs))
        .route("/orders/:id/shuttles", post(create_shuttle))
        .route("/handoffs/pending", get(list_pending))
        .route("/handoffs/:id/accept", post(accept_handoff))
}

async fn create_handoff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<StopRequest>,
) -> Result<Json<HandoffOutcome>, AppError> {
    Ok(Json(handoff::create_handoff(&state, &actor, id, payload).await?))
}

async fn create_shuttle(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<StopRequest>,
) -> Result<Json<ShuttleOutcome>, AppError> {
    Ok(Json(handoff::create_shuttle(&state, &actor, id, payload).await?))
}

async fn accept_handoff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptOutcome>, AppError> {
    Ok(Json(handoff::accept_handoff(&state, &actor, id).await?))
}

async fn list_handoffs(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderHandoff>>, AppError> {
    Ok(Json(handoff::list_handoffs(&state, &actor, id)?))
}

async fn list_pending(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<OrderHandoff>> {
    Json(handoff::list_pending_handoffs(&state, &actor))
}
