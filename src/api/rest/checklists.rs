use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::post;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::checklist::{self, ChecklistOutcome, StepStatus};
use crate::error::AppError;
use crate::models::checklist::{Checklist, ChecklistContent, ChecklistKind};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/orders/:id/checklists/:kind",
            post(open_checklist).get(get_checklist).put(save_draft),
        )
        .route("/orders/:id/checklists/:kind/submit", post(submit_checklist))
}

#[derive(Serialize)]
pub struct ChecklistView {
    #[serde(flatten)]
    pub checklist: Checklist,
    pub steps: Vec<StepStatus>,
}

impl From<Checklist> for ChecklistView {
    fn from(checklist: Checklist) -> Self {
        let steps = checklist::step_status(&checklist.content, checklist.kind);
        Self { checklist, steps }
    }
}

async fn open_checklist(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, kind)): Path<(Uuid, ChecklistKind)>,
) -> Result<Json<ChecklistOutcome>, AppError> {
    Ok(Json(checklist::open_checklist(&state, &actor, id, kind).await?))
}

async fn get_checklist(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, kind)): Path<(Uuid, ChecklistKind)>,
) -> Result<Json<ChecklistView>, AppError> {
    let checklist = checklist::get_checklist(&state, &actor, id, kind)?;
    Ok(Json(checklist.into()))
}

async fn save_draft(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, kind)): Path<(Uuid, ChecklistKind)>,
    Json(payload): Json<ChecklistContent>,
) -> Result<Json<ChecklistView>, AppError> {
    let checklist = checklist::save_draft(&state, &actor, id, kind, payload).await?;
    Ok(Json(checklist.into()))
}

async fn submit_checklist(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, kind)): Path<(Uuid, ChecklistKind)>,
    Json(payload): Json<ChecklistContent>,
) -> Result<Json<ChecklistOutcome>, AppError> {
    Ok(Json(
        checklist::submit_checklist(&state, &actor, id, kind, payload).await?,
    ))
}
