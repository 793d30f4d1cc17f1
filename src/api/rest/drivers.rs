use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::orders::{self, CreateDriverRequest};
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/active", patch(update_driver_active))
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub active: bool,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(orders::create_driver(&state, &actor, payload)?))
}

async fn list_drivers(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<Driver>> {
    Json(orders::list_drivers(&state, &actor))
}

async fn update_driver_active(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(orders::set_driver_active(
        &state,
        &actor,
        id,
        payload.active,
    )?))
}
