use crate::db::{Repository, Settlement};
use crate::domain::{BidStatus, GameId, PeriodStatus, TimeMs};
use crate::engine::{chunk_ops, plan_finalization, SettleOutcome, StatusChange};
use crate::provider::{GameConfigProvider, ProviderError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Runs finalization for closed periods.
///
/// Stateless between calls: progress lives entirely in bid statuses and
/// roster entries, so a failed or interrupted run is resumed by calling
/// `finalize` again.
#[derive(Clone)]
pub struct Finalizer {
    repo: Arc<Repository>,
    provider: Arc<dyn GameConfigProvider>,
    batch_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationReport {
    pub game_id: GameId,
    pub period: String,
    pub status: PeriodStatus,
    pub bids_considered: usize,
    pub riders: usize,
    pub chunks_committed: usize,
    pub awarded: usize,
    pub already_applied: usize,
    pub lost: usize,
    pub cancelled_over_budget: usize,
    pub cancelled_team_full: usize,
    pub cancelled_duplicate: usize,
    pub cancelled_overflow: usize,
    pub transitions: Vec<StatusChange>,
    pub settlements: Vec<Settlement>,
}

impl FinalizationReport {
    fn count_to(&self, status: BidStatus) -> usize {
        self.transitions.iter().filter(|t| t.to == status).count()
    }

    fn count_outcome(&self, outcome: SettleOutcome) -> usize {
        self.settlements.iter().filter(|s| s.outcome == outcome).count()
    }

    fn tally(&mut self) {
        self.awarded = self.count_outcome(SettleOutcome::Awarded);
        self.already_applied = self.count_outcome(SettleOutcome::AlreadyApplied);
        self.lost = self.count_to(BidStatus::Lost);
        self.cancelled_over_budget = self.count_to(BidStatus::CancelledOverBudget);
        self.cancelled_team_full = self.count_to(BidStatus::CancelledTeamFull);
        self.cancelled_duplicate = self.count_to(BidStatus::CancelledDuplicate);
        self.cancelled_overflow = self.count_to(BidStatus::CancelledOverflow);
    }
}

impl Finalizer {
    pub fn new(repo: Arc<Repository>, provider: Arc<dyn GameConfigProvider>, batch_limit: usize) -> Self {
        Self {
            repo,
            provider,
            batch_limit: batch_limit.max(1),
        }
    }

    pub async fn finalize(&self, game_id: &GameId, name: &str) -> Result<FinalizationReport, FinalizeError> {
        self.finalize_at(game_id, name, TimeMs::now()).await
    }

    /// Finalize a `closed` period, or re-run an already `finalized` one.
    ///
    /// `now` stamps new roster entries and the run bookkeeping.
    pub async fn finalize_at(
        &self,
        game_id: &GameId,
        name: &str,
        now: TimeMs,
    ) -> Result<FinalizationReport, FinalizeError> {
        let period = self
            .repo
            .get_period(game_id, name)
            .await?
            .ok_or_else(|| FinalizeError::PeriodNotFound {
                game_id: game_id.clone(),
                name: name.to_string(),
            })?;
        if !matches!(period.status, PeriodStatus::Closed | PeriodStatus::Finalized) {
            return Err(FinalizeError::PeriodNotClosed {
                name: name.to_string(),
                status: period.status,
            });
        }

        let max_riders = self.provider.game_config(game_id).await?.limits.max_riders;

        let bids = self
            .repo
            .bids_in_window(
                game_id,
                period.start,
                period.end,
                &[BidStatus::Active, BidStatus::Won, BidStatus::Outbid],
            )
            .await?;
        let bids_considered = bids.len();
        let plans = plan_finalization(bids);
        let riders = plans.len();
        let chunks = chunk_ops(plans, self.batch_limit);
        let total_chunks = chunks.len();

        info!(
            game_id = %game_id,
            period = %name,
            bids = bids_considered,
            riders,
            chunks = total_chunks,
            "Finalization started"
        );

        let mut report = FinalizationReport {
            game_id: game_id.clone(),
            period: name.to_string(),
            status: period.status,
            bids_considered,
            riders,
            chunks_committed: 0,
            awarded: 0,
            already_applied: 0,
            lost: 0,
            cancelled_over_budget: 0,
            cancelled_team_full: 0,
            cancelled_duplicate: 0,
            cancelled_overflow: 0,
            transitions: Vec::new(),
            settlements: Vec::new(),
        };

        for chunk in &chunks {
            match self.repo.apply_finalize_chunk(&period, chunk, max_riders, now).await {
                Ok(result) => {
                    report.chunks_committed += 1;
                    report.transitions.extend(result.transitions);
                    report.settlements.extend(result.settlements);
                }
                Err(source) => {
                    warn!(
                        game_id = %game_id,
                        period = %name,
                        committed = report.chunks_committed,
                        total = total_chunks,
                        error = %source,
                        "Finalization chunk failed"
                    );
                    return Err(FinalizeError::Chunk {
                        committed: report.chunks_committed,
                        total: total_chunks,
                        source,
                    });
                }
            }
        }

        if period.status == PeriodStatus::Closed {
            self.repo
                .compare_and_set_period_status(game_id, name, PeriodStatus::Closed, PeriodStatus::Finalized)
                .await?;
        }
        report.status = PeriodStatus::Finalized;
        report.tally();

        info!(
            game_id = %game_id,
            period = %name,
            awarded = report.awarded,
            already_applied = report.already_applied,
            lost = report.lost,
            over_budget = report.cancelled_over_budget,
            team_full = report.cancelled_team_full,
            duplicate = report.cancelled_duplicate,
            overflow = report.cancelled_overflow,
            "Finalization complete"
        );
        Ok(report)
    }
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("Period {name} not found in game {game_id}")]
    PeriodNotFound { game_id: GameId, name: String },
    #[error("Period {name} is {status}, finalization needs it closed")]
    PeriodNotClosed { name: String, status: PeriodStatus },
    #[error("Chunk {} of {total} failed after {committed} committed: {source}", .committed + 1)]
    Chunk {
        committed: usize,
        total: usize,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
