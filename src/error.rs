use crate::config::ConfigError;
use crate::orchestration::{AuditError, BidError, FinalizeError, PeriodError};
use crate::provider::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },
    #[error("{message}")]
    Unavailable { code: &'static str, message: String },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict { code, .. }
            | AppError::Unprocessable { code, .. }
            | AppError::Unavailable { code, .. } => code,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownGame(game) => AppError::NotFound(format!("game {}", game)),
            other => AppError::Unavailable {
                code: "provider_error",
                message: other.to_string(),
            },
        }
    }
}

impl From<BidError> for AppError {
    fn from(err: BidError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            BidError::PeriodNotOpen { .. } | BidError::DuplicateBid(_) => {
                AppError::Conflict { code, message }
            }
            BidError::RiderIneligible(_)
            | BidError::BudgetExceeded { .. }
            | BidError::InvalidAmount(_)
            | BidError::UnknownParticipant(_) => AppError::Unprocessable { code, message },
            BidError::Contention(_) => AppError::Unavailable { code, message },
            BidError::Provider(e) => e.into(),
            BidError::Db(e) => e.into(),
        }
    }
}

impl From<PeriodError> for AppError {
    fn from(err: PeriodError) -> Self {
        match err {
            PeriodError::NotFound { .. } => AppError::NotFound(err.to_string()),
            PeriodError::InvalidTransition(e) => AppError::Conflict {
                code: "invalid_transition",
                message: e.to_string(),
            },
            PeriodError::Provider(e) => e.into(),
            PeriodError::Db(e) => e.into(),
        }
    }
}

impl From<FinalizeError> for AppError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::PeriodNotFound { .. } => AppError::NotFound(err.to_string()),
            FinalizeError::PeriodNotClosed { .. } => AppError::Conflict {
                code: "period_not_closed",
                message: err.to_string(),
            },
            FinalizeError::Chunk { .. } => AppError::Unavailable {
                code: "chunk_failed",
                message: err.to_string(),
            },
            FinalizeError::Provider(e) => e.into(),
            FinalizeError::Db(e) => e.into(),
        }
    }
}

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Provider(e) => e.into(),
            AuditError::Db(e) => e.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameId, RiderId, TimeMs};

    #[test]
    fn test_bid_errors_map_to_client_statuses() {
        let cases = [
            (
                BidError::PeriodNotOpen {
                    game_id: GameId::new("g"),
                    now: TimeMs::new(0),
                },
                StatusCode::CONFLICT,
                "period_not_open",
            ),
            (
                BidError::RiderIneligible(RiderId::new("r1")),
                StatusCode::UNPROCESSABLE_ENTITY,
                "rider_ineligible",
            ),
            (
                BidError::BudgetExceeded {
                    amount: 10,
                    remaining: 5,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
                "budget_exceeded",
            ),
            (
                BidError::DuplicateBid(RiderId::new("r1")),
                StatusCode::CONFLICT,
                "duplicate_bid",
            ),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn test_unknown_game_is_not_found() {
        let app: AppError = ProviderError::UnknownGame("g".to_string()).into();
        assert_eq!(app.status(), StatusCode::NOT_FOUND);

        let app: AppError = ProviderError::RateLimited.into();
        assert_eq!(app.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
