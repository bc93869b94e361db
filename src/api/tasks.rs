//! Task API endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::TaskRepository;
use crate::models::Task;
use crate::utils::{AppError, AppResult};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/{uuid}", get(get_task))
}

/// Current state of a task
async fn get_task(State(state): State<AppState>, Path(uuid): Path<String>) -> AppResult<Json<Task>> {
    let mut conn = state.db.acquire().await?;
    let task = TaskRepository::new(&mut conn)
        .get_by_uuid(&uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task '{}' not found", uuid)))?;

    Ok(Json(task))
}
