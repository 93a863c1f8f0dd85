use crate::db::{BidCommit, Repository};
use crate::domain::{Bid, GameId, PeriodStatus, RiderId, TimeMs, UserId};
use crate::engine::place;
use crate::provider::{GameConfigProvider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Validates and records single bids.
#[derive(Clone)]
pub struct BidIntake {
    repo: Arc<Repository>,
    provider: Arc<dyn GameConfigProvider>,
    retry_limit: u32,
}

impl BidIntake {
    pub fn new(repo: Arc<Repository>, provider: Arc<dyn GameConfigProvider>, retry_limit: u32) -> Self {
        Self {
            repo,
            provider,
            retry_limit: retry_limit.max(1),
        }
    }

    /// Place a bid at `now`.
    ///
    /// Checks run in a fixed order: open period, rider eligibility, budget,
    /// then duplicates. Every check after the period lookup is re-run against
    /// fresh state whenever the rider's version moved under us.
    pub async fn place_bid(
        &self,
        game_id: &GameId,
        user_id: &UserId,
        rider_id: &RiderId,
        amount: i64,
        now: TimeMs,
    ) -> Result<Bid, BidError> {
        if amount <= 0 {
            return Err(BidError::InvalidAmount(amount));
        }

        let period = self
            .repo
            .period_at(game_id, now)
            .await?
            .filter(|p| p.status == PeriodStatus::Active)
            .ok_or_else(|| BidError::PeriodNotOpen {
                game_id: game_id.clone(),
                now,
            })?;

        let config = self.provider.game_config(game_id).await?;
        if !config.is_eligible(rider_id) {
            return Err(BidError::RiderIneligible(rider_id.clone()));
        }

        for attempt in 0..self.retry_limit {
            let snapshot = self.repo.rider_snapshot(game_id, &period.name, rider_id, user_id).await?;
            if snapshot
                .auction_holder
                .as_ref()
                .is_some_and(|holder| holder != user_id)
            {
                return Err(BidError::RiderIneligible(rider_id.clone()));
            }

            let participant = self
                .repo
                .get_participant(game_id, user_id)
                .await?
                .ok_or_else(|| BidError::UnknownParticipant(user_id.clone()))?;
            let remaining = participant.remaining_budget();
            if amount > remaining {
                return Err(BidError::BudgetExceeded { amount, remaining });
            }

            let has_live_bid = snapshot.active_bids.iter().any(|b| b.user_id == *user_id);
            if snapshot.user_holds_entry || has_live_bid {
                return Err(BidError::DuplicateBid(rider_id.clone()));
            }

            let mut bid = Bid::new(
                game_id.clone(),
                period.name.clone(),
                user_id.clone(),
                rider_id.clone(),
                amount,
                now,
            );
            let placement = place(&snapshot.active_bids, &bid);
            bid.status = placement.status;

            match self
                .repo
                .commit_bid(snapshot.version, &bid, &placement.outbid)
                .await?
            {
                BidCommit::Committed => {
                    info!(
                        game_id = %game_id,
                        period = %period.name,
                        rider_id = %rider_id,
                        bid_id = %bid.id,
                        amount,
                        status = %bid.status,
                        outbid = placement.outbid.len(),
                        "Bid placed"
                    );
                    return Ok(bid);
                }
                BidCommit::Conflict => {
                    debug!(rider_id = %rider_id, attempt, "Bid lost the rider CAS, retrying");
                }
                BidCommit::PeriodClosed => {
                    return Err(BidError::PeriodNotOpen {
                        game_id: game_id.clone(),
                        now,
                    });
                }
            }
        }

        Err(BidError::Contention(rider_id.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BidError {
    #[error("No auction period is open for game {game_id} at {now}")]
    PeriodNotOpen { game_id: GameId, now: TimeMs },
    #[error("Rider {0} is not eligible for bidding")]
    RiderIneligible(RiderId),
    #[error("Bid of {amount} exceeds remaining budget {remaining}")]
    BudgetExceeded { amount: i64, remaining: i64 },
    #[error("Already holding or bidding on rider {0}")]
    DuplicateBid(RiderId),
    #[error("Bid amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("User {0} is not a participant of this game")]
    UnknownParticipant(UserId),
    #[error("Rider {0} is under heavy contention, try again")]
    Contention(RiderId),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl BidError {
    /// Machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            BidError::PeriodNotOpen { .. } => "period_not_open",
            BidError::RiderIneligible(_) => "rider_ineligible",
            BidError::BudgetExceeded { .. } => "budget_exceeded",
            BidError::DuplicateBid(_) => "duplicate_bid",
            BidError::InvalidAmount(_) => "invalid_amount",
            BidError::UnknownParticipant(_) => "unknown_participant",
            BidError::Contention(_) => "contention",
            BidError::Provider(_) => "provider_error",
            BidError::Db(_) => "ledger_error",
        }
    }
}
