//! In-memory game configuration provider for tests and local runs.

use super::{GameConfig, GameConfigProvider, GameLimits, ProviderError};
use crate::domain::{AuctionPeriod, GameId, RiderId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Mock provider holding per-game configuration in memory.
///
/// Clones share state, so tests can tweak limits or the rider pool after the
/// provider has been handed to a service.
#[derive(Debug, Clone, Default)]
pub struct MockGameConfigProvider {
    games: Arc<RwLock<HashMap<GameId, GameConfig>>>,
}

impl MockGameConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a game with the given periods, rider pool, and roster cap.
    pub fn with_game(
        self,
        game_id: GameId,
        periods: Vec<AuctionPeriod>,
        riders: impl IntoIterator<Item = RiderId>,
        max_riders: i64,
    ) -> Self {
        let config = GameConfig {
            game_id: game_id.clone(),
            periods,
            eligible_riders: riders.into_iter().collect::<BTreeSet<_>>(),
            limits: GameLimits {
                max_riders,
                ..GameLimits::default()
            },
        };
        self.write().insert(game_id, config);
        self
    }

    /// Change the roster cap of an already registered game.
    pub fn set_max_riders(&self, game_id: &GameId, max_riders: i64) {
        if let Some(config) = self.write().get_mut(game_id) {
            config.limits.max_riders = max_riders;
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<GameId, GameConfig>> {
        self.games.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GameConfigProvider for MockGameConfigProvider {
    async fn game_config(&self, game_id: &GameId) -> Result<GameConfig, ProviderError> {
        let games = self.games.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        games
            .get(game_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownGame(game_id.to_string()))
    }
}
