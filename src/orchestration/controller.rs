use crate::db::Repository;
use crate::domain::{AuctionPeriod, GameId, PeriodStatus, PeriodTransitionError, TimeMs};
use crate::engine::advance_status;
use crate::provider::{GameConfigProvider, ProviderError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Owns auction period lifecycle transitions.
#[derive(Clone)]
pub struct PeriodController {
    repo: Arc<Repository>,
    provider: Arc<dyn GameConfigProvider>,
    batch_limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Period definitions accepted from the provider.
    pub synced: usize,
    /// Rows inserted or whose dates changed.
    pub changed: usize,
    /// Names of periods rejected for an invalid window.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReopenReport {
    pub game_id: GameId,
    pub period: String,
    pub previous_status: PeriodStatus,
    pub status: PeriodStatus,
    pub reset_bids: u64,
    pub reset_chunks: usize,
}

impl PeriodController {
    pub fn new(repo: Arc<Repository>, provider: Arc<dyn GameConfigProvider>, batch_limit: usize) -> Self {
        Self {
            repo,
            provider,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Upsert the provider's period definitions into the ledger.
    ///
    /// New periods start `pending`; existing rows keep their status.
    pub async fn sync_periods(&self, game_id: &GameId) -> Result<SyncReport, PeriodError> {
        let config = self.provider.game_config(game_id).await?;
        let mut report = SyncReport::default();

        for period in config.periods {
            let checked = match AuctionPeriod::new(
                game_id.clone(),
                period.name.clone(),
                period.start,
                period.end,
                period.finalize_at,
            ) {
                Ok(p) => p,
                Err(e) => {
                    warn!(game_id = %game_id, period = %period.name, error = %e, "Rejecting period definition");
                    report.rejected.push(period.name);
                    continue;
                }
            };

            if self.repo.upsert_period_definition(&checked).await? {
                report.changed += 1;
            }
            report.synced += 1;
        }

        Ok(report)
    }

    /// Apply the time-driven transition for one period.
    ///
    /// Returns the status in effect afterwards. Losing a race to another
    /// writer is not an error; the winner's status is returned.
    pub async fn advance(&self, game_id: &GameId, name: &str, now: TimeMs) -> Result<PeriodStatus, PeriodError> {
        let period = self.load(game_id, name).await?;
        let next = advance_status(&period, now);
        if next == period.status {
            return Ok(next);
        }
        period.status.advance(next)?;

        if self
            .repo
            .compare_and_set_period_status(game_id, name, period.status, next)
            .await?
        {
            info!(game_id = %game_id, period = %name, from = %period.status, to = %next, "Period advanced");
            Ok(next)
        } else {
            Ok(self.load(game_id, name).await?.status)
        }
    }

    /// Administrative reopen: finalized|closed -> closed.
    ///
    /// With `reset_bids`, every `won`/`cancelled_*` bid inside the window is put
    /// back to `active` in chunks of the batch limit. Without it the next
    /// finalization re-validates existing outcomes in place.
    pub async fn reopen(&self, game_id: &GameId, name: &str, reset_bids: bool) -> Result<ReopenReport, PeriodError> {
        let period = self.load(game_id, name).await?;
        if !period.status.can_reopen() {
            return Err(PeriodError::InvalidTransition(PeriodTransitionError {
                from: period.status,
                to: PeriodStatus::Closed,
            }));
        }

        if period.status == PeriodStatus::Finalized
            && !self
                .repo
                .compare_and_set_period_status(game_id, name, PeriodStatus::Finalized, PeriodStatus::Closed)
                .await?
        {
            let current = self.load(game_id, name).await?.status;
            if current != PeriodStatus::Closed {
                return Err(PeriodError::InvalidTransition(PeriodTransitionError {
                    from: current,
                    to: PeriodStatus::Closed,
                }));
            }
        }

        let mut report = ReopenReport {
            game_id: game_id.clone(),
            period: name.to_string(),
            previous_status: period.status,
            status: PeriodStatus::Closed,
            reset_bids: 0,
            reset_chunks: 0,
        };

        if reset_bids {
            loop {
                let reset = self
                    .repo
                    .reset_bids_in_window_chunk(game_id, period.start, period.end, self.batch_limit)
                    .await?;
                if reset == 0 {
                    break;
                }
                report.reset_bids += reset;
                report.reset_chunks += 1;
            }
        }

        info!(
            game_id = %game_id,
            period = %name,
            previous = %period.status,
            reset_bids = report.reset_bids,
            "Period reopened"
        );
        Ok(report)
    }

    async fn load(&self, game_id: &GameId, name: &str) -> Result<AuctionPeriod, PeriodError> {
        self.repo
            .get_period(game_id, name)
            .await?
            .ok_or_else(|| PeriodError::NotFound {
                game_id: game_id.clone(),
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Error)]
pub enum PeriodError {
    #[error("Period {name} not found in game {game_id}")]
    NotFound { game_id: GameId, name: String },
    #[error(transparent)]
    InvalidTransition(#[from] PeriodTransitionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
