use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{page_limit, AppState};
use crate::db::RosterQuery;
use crate::domain::{GameId, Participant, RiderId, RosterEntry, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterParams {
    pub user_id: Option<String>,
    pub rider_id: Option<String>,
    /// Omit for both active and soft-removed entries.
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterResponse {
    pub entries: Vec<RosterEntry>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub user_id: UserId,
    pub budget: i64,
    pub spent_budget: i64,
    pub remaining_budget: i64,
    pub roster_size: i64,
}

impl From<Participant> for ParticipantDto {
    fn from(p: Participant) -> Self {
        Self {
            remaining_budget: p.remaining_budget(),
            user_id: p.user_id,
            budget: p.budget,
            spent_budget: p.spent_budget,
            roster_size: p.roster_size,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsResponse {
    pub participants: Vec<ParticipantDto>,
}

pub async fn list_roster(
    Path(game): Path<String>,
    Query(params): Query<RosterParams>,
    State(state): State<AppState>,
) -> Result<Json<RosterResponse>, AppError> {
    let limit = page_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);
    let query = RosterQuery {
        user_id: params.user_id.map(UserId::new),
        rider_id: params.rider_id.map(RiderId::new),
        active: params.active,
        limit: Some(limit),
        offset: Some(offset),
    };

    let entries = state.repo.query_roster(&GameId::new(game), &query).await?;
    Ok(Json(RosterResponse {
        entries,
        limit,
        offset,
    }))
}

pub async fn list_participants(
    Path(game): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    let participants = state
        .repo
        .list_participants(&GameId::new(game))
        .await?
        .into_iter()
        .map(ParticipantDto::from)
        .collect();

    Ok(Json(ParticipantsResponse { participants }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_dto_derives_remaining() {
        let dto = ParticipantDto::from(Participant {
            game_id: GameId::new("g"),
            user_id: UserId::new("alice"),
            budget: 100,
            spent_budget: 35,
            roster_size: 2,
        });
        assert_eq!(dto.remaining_budget, 65);

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["remainingBudget"], 65);
    }
}
