use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::domain::GameId;
use crate::error::AppError;
use crate::orchestration::{divergences_to_csv, RepairReport};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditParams {
    /// `json` (default) or `csv`.
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for RepairRequest {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
        }
    }
}

fn default_dry_run() -> bool {
    true
}

pub async fn get_audit(
    Path(game): Path<String>,
    Query(params): Query<AuditParams>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    let game_id = GameId::new(game);

    match params.format.as_deref().unwrap_or("json") {
        "json" => {
            let report = state.auditor.audit(&game_id).await?;
            Ok(Json(report).into_response())
        }
        "csv" => {
            let report = state.auditor.audit(&game_id).await?;
            let body = divergences_to_csv(&report.divergences)?;
            Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response())
        }
        other => Err(AppError::BadRequest(format!(
            "Invalid format: {} (expected json or csv)",
            other
        ))),
    }
}

/// Correct participant cache drift. Dry run unless `dryRun: false` is sent.
pub async fn repair(
    Path(game): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RepairRequest>>,
) -> Result<Json<RepairReport>, AppError> {
    let admin = state.require_admin(&headers)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let game_id = GameId::new(game);
    info!(game_id = %game_id, admin = %admin, dry_run = req.dry_run, "Repair requested");

    let report = state.auditor.repair(&game_id, req.dry_run).await?;
    Ok(Json(report))
}
