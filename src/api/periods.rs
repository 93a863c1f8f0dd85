use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::domain::{AuctionPeriod, GameId, PeriodStatus, TimeMs};
use crate::error::AppError;
use crate::orchestration::{FinalizationReport, ReopenReport};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodsResponse {
    pub periods: Vec<AuctionPeriod>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub period: String,
    pub status: PeriodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReopenRequest {
    #[serde(default)]
    pub reset_bids: bool,
}

pub async fn list_periods(
    Path(game): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PeriodsResponse>, AppError> {
    let periods = state.repo.list_periods(&GameId::new(game)).await?;
    Ok(Json(PeriodsResponse { periods }))
}

pub async fn advance_period(
    Path((game, name)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdvanceResponse>, AppError> {
    let admin = state.require_admin(&headers)?;
    let game_id = GameId::new(game);

    // pull any new period definitions before stepping the clock
    state.controller.sync_periods(&game_id).await?;
    let status = state.controller.advance(&game_id, &name, TimeMs::now()).await?;
    info!(game_id = %game_id, period = %name, admin = %admin, status = %status, "Advance requested");

    Ok(Json(AdvanceResponse { period: name, status }))
}

pub async fn finalize_period(
    Path((game, name)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FinalizationReport>, AppError> {
    let admin = state.require_admin(&headers)?;
    let game_id = GameId::new(game);
    info!(game_id = %game_id, period = %name, admin = %admin, "Finalization requested");

    let report = state.finalizer.finalize(&game_id, &name).await?;
    Ok(Json(report))
}

/// Reopen a closed or finalized period. An absent body means `resetBids: false`.
pub async fn reopen_period(
    Path((game, name)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ReopenRequest>>,
) -> Result<Json<ReopenReport>, AppError> {
    let admin = state.require_admin(&headers)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let game_id = GameId::new(game);
    info!(
        game_id = %game_id,
        period = %name,
        admin = %admin,
        reset_bids = req.reset_bids,
        "Reopen requested"
    );

    let report = state.controller.reopen(&game_id, &name, req.reset_bids).await?;
    Ok(Json(report))
}
