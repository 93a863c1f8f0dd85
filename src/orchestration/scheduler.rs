use crate::db::Repository;
use crate::domain::{AuctionPeriod, GameId, PeriodStatus, TimeMs};
use crate::engine::finalization_due;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::controller::{PeriodController, PeriodError};
use super::finalize::{FinalizationReport, Finalizer};

/// Drives periods forward on a timer: sync, advance, then finalize what is due.
#[derive(Clone)]
pub struct Scheduler {
    repo: Arc<Repository>,
    controller: PeriodController,
    finalizer: Finalizer,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub advanced: Vec<(String, PeriodStatus)>,
    pub finalized: Vec<FinalizationReport>,
    /// Per-period failures; a failed period does not stop the tick.
    pub errors: Vec<String>,
}

impl Scheduler {
    pub fn new(repo: Arc<Repository>, controller: PeriodController, finalizer: Finalizer) -> Self {
        Self {
            repo,
            controller,
            finalizer,
        }
    }

    /// One pass over a game's periods at `now`.
    pub async fn tick(&self, game_id: &GameId, now: TimeMs) -> Result<TickReport, PeriodError> {
        let sync = self.controller.sync_periods(game_id).await?;
        if sync.changed > 0 {
            info!(game_id = %game_id, changed = sync.changed, "Period definitions synced");
        }

        let mut report = TickReport::default();
        for period in self.repo.list_periods(game_id).await? {
            let status = match self.controller.advance(game_id, &period.name, now).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(game_id = %game_id, period = %period.name, error = %e, "Advance failed");
                    report.errors.push(format!("{}: {}", period.name, e));
                    continue;
                }
            };
            if status != period.status {
                report.advanced.push((period.name.clone(), status));
            }

            let current = AuctionPeriod { status, ..period };
            if finalization_due(&current, now) {
                match self.finalizer.finalize_at(game_id, &current.name, now).await {
                    Ok(r) => report.finalized.push(r),
                    Err(e) => {
                        warn!(game_id = %game_id, period = %current.name, error = %e, "Scheduled finalization failed");
                        report.errors.push(format!("{}: {}", current.name, e));
                    }
                }
            }
        }

        Ok(report)
    }

    /// Tick every game forever at `interval`. Failures are logged, never fatal.
    ///
    /// Games tick concurrently; periods within one game tick in order.
    pub async fn run(self, games: Vec<GameId>, interval: Duration) {
        info!(games = games.len(), interval_ms = interval.as_millis() as u64, "Scheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = TimeMs::now();
            let results = join_all(games.iter().map(|game_id| self.tick(game_id, now))).await;
            for (game_id, result) in games.iter().zip(results) {
                if let Err(e) = result {
                    warn!(game_id = %game_id, error = %e, "Scheduler tick failed");
                }
            }
        }
    }
}
