use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{caller, page_limit, AppState};
use crate::db::BidQuery;
use crate::domain::{Bid, BidStatus, GameId, RiderId, TimeMs, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub rider_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidsQuery {
    pub status: Option<String>,
    pub rider_id: Option<String>,
    pub user_id: Option<String>,
    pub period: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidsResponse {
    pub bids: Vec<Bid>,
    pub limit: i64,
    pub offset: i64,
}

/// POST /v1/games/:game/bids on behalf of the identity header's user.
pub async fn place_bid(
    Path(game): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PlaceBidRequest>,
) -> Result<(StatusCode, Json<Bid>), AppError> {
    let user = caller(&headers)?;
    if req.rider_id.trim().is_empty() {
        return Err(AppError::BadRequest("riderId must not be empty".to_string()));
    }

    let bid = state
        .intake
        .place_bid(
            &GameId::new(game),
            &user,
            &RiderId::new(req.rider_id.trim()),
            req.amount,
            TimeMs::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(bid)))
}

pub async fn list_bids(
    Path(game): Path<String>,
    Query(params): Query<BidsQuery>,
    State(state): State<AppState>,
) -> Result<Json<BidsResponse>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<BidStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(format!("Invalid status: {}", e)))?;

    let limit = page_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);
    let query = BidQuery {
        status,
        rider_id: params.rider_id.map(RiderId::new),
        user_id: params.user_id.map(UserId::new),
        period: params.period,
        limit: Some(limit),
        offset: Some(offset),
    };

    let bids = state.repo.query_bids(&GameId::new(game), &query).await?;
    Ok(Json(BidsResponse { bids, limit, offset }))
}
