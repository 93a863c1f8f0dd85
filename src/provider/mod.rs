//! Game configuration collaborator: periods, eligible riders, and limits per game.

use crate::domain::{AuctionPeriod, GameId, RiderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpGameConfigProvider;
pub use mock::MockGameConfigProvider;

/// Per-game limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLimits {
    /// Maximum number of active riders per roster.
    pub max_riders: i64,
    /// Number of decimal places the UI renders amounts with.
    pub currency_scale: u32,
}

impl Default for GameLimits {
    fn default() -> Self {
        Self {
            max_riders: 32,
            currency_scale: 0,
        }
    }
}

/// Everything the core needs to know about a game's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub game_id: GameId,
    /// Period definitions as published, windows not yet validated. Status is
    /// owned by the ledger; these are always `pending`.
    pub periods: Vec<AuctionPeriod>,
    pub eligible_riders: BTreeSet<RiderId>,
    pub limits: GameLimits,
}

impl GameConfig {
    pub fn is_eligible(&self, rider: &RiderId) -> bool {
        self.eligible_riders.contains(rider)
    }
}

/// Source of game configuration.
///
/// Implementations convert timestamps to `TimeMs` before returning.
#[async_trait]
pub trait GameConfigProvider: Send + Sync + fmt::Debug {
    async fn game_config(&self, game_id: &GameId) -> Result<GameConfig, ProviderError>;
}

/// Error type for configuration provider operations.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON, malformed timestamp, bad window)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// The provider has no configuration for this game
    UnknownGame(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ProviderError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            ProviderError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ProviderError::RateLimited => write!(f, "Rate limited"),
            ProviderError::UnknownGame(game) => write!(f, "Unknown game: {}", game),
        }
    }
}

impl std::error::Error for ProviderError {}
