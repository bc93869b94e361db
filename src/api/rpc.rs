//! Report intake
//!
//! The execution layer posts one report per request. Reports are validated
//! before they reach the receiver; a rejected report changes nothing.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::RpcReport;
use crate::services::Disposition;
use crate::utils::AppResult;
use crate::AppState;

/// Acknowledgement of a handled report
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcAccepted {
    pub task_uuid: String,
    pub disposition: Disposition,
}

/// Handle one report
pub async fn receive_report(
    State(state): State<AppState>,
    Json(report): Json<RpcReport>,
) -> AppResult<(StatusCode, Json<RpcAccepted>)> {
    report.validate()?;

    let task_uuid = report.task_uuid().to_string();
    debug!(method = report.method(), task_uuid = %task_uuid, "Report accepted for handling");

    let disposition = state.receiver.handle(report).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RpcAccepted {
            task_uuid,
            disposition,
        }),
    ))
}
