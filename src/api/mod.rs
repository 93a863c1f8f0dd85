pub mod audit;
pub mod bids;
pub mod health;
pub mod periods;
pub mod roster;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::UserId;
use crate::error::AppError;
use crate::orchestration::{Auditor, BidIntake, Finalizer, PeriodController};
use crate::provider::GameConfigProvider;
use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Header carrying the caller's authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub intake: BidIntake,
    pub controller: PeriodController,
    pub finalizer: Finalizer,
    pub auditor: Auditor,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, provider: Arc<dyn GameConfigProvider>, config: Config) -> Self {
        Self {
            intake: BidIntake::new(repo.clone(), provider.clone(), config.bid_retry_limit),
            controller: PeriodController::new(repo.clone(), provider.clone(), config.ledger_batch_limit),
            finalizer: Finalizer::new(repo.clone(), provider.clone(), config.ledger_batch_limit),
            auditor: Auditor::new(repo.clone(), provider),
            repo,
            config,
        }
    }

    pub fn require_admin(&self, headers: &HeaderMap) -> Result<UserId, AppError> {
        let user = caller(headers)?;
        if !self.config.is_admin(user.as_str()) {
            return Err(AppError::Forbidden(format!("{} is not an administrator", user)));
        }
        Ok(user)
    }
}

/// The user named by the identity header.
pub fn caller(headers: &HeaderMap) -> Result<UserId, AppError> {
    let raw = headers
        .get(USER_HEADER)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_HEADER)))?;
    let user = raw
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{} must be ASCII", USER_HEADER)))?
        .trim();
    if user.is_empty() {
        return Err(AppError::Unauthorized(format!("empty {} header", USER_HEADER)));
    }
    Ok(UserId::new(user))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/games/:game/bids",
            get(bids::list_bids).post(bids::place_bid),
        )
        .route("/v1/games/:game/roster", get(roster::list_roster))
        .route("/v1/games/:game/participants", get(roster::list_participants))
        .route("/v1/games/:game/periods", get(periods::list_periods))
        .route(
            "/v1/games/:game/periods/:name/advance",
            post(periods::advance_period),
        )
        .route(
            "/v1/games/:game/periods/:name/finalize",
            post(periods::finalize_period),
        )
        .route(
            "/v1/games/:game/periods/:name/reopen",
            post(periods::reopen_period),
        )
        .route("/v1/games/:game/audit", get(audit::get_audit))
        .route("/v1/games/:game/audit/repair", post(audit::repair))
        .layer(cors)
        .with_state(state)
}

/// Clamp a requested page size to 1..=1000, defaulting to 100.
pub(crate) fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 1000)
}
