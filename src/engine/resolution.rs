//! Finalization planning and settlement decisions.
//!
//! Everything here is pure. The repository runs `decide_settlement` inside the
//! chunk transaction with state read from that same transaction, so decisions
//! are always made against current ledger state, never against the snapshot
//! the plan was built from.

use crate::domain::{rank_bids, Bid, BidId, BidStatus, RiderId, RosterTotals, TimeMs, UserId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Resolution plan for one rider's contested bids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiderPlan {
    pub rider_id: RiderId,
    /// Top-ranked bid among `active` and `won` bids; `None` when every bid
    /// for the rider was outbid.
    pub winner: Option<Bid>,
    /// Non-winning `active` and `outbid` bids, in rank order.
    pub losers: Vec<Bid>,
    /// Non-winning bids already marked `won` (duplicate winners).
    pub contenders: Vec<Bid>,
}

impl RiderPlan {
    /// Placement of the bid that orders this plan: the winner, else the best loser.
    fn order_key(&self) -> (TimeMs, &str) {
        let lead = self.winner.as_ref().or_else(|| self.losers.first());
        lead.map_or((TimeMs::new(0), ""), |b| (b.placed_at, b.id.as_str()))
    }
}

/// Group bids by rider and pick each rider's winner.
///
/// The winner is drawn from `active` and `won` bids; `outbid` bids only ever
/// lose. A rider whose bids were all outbid gets a plan with losers only.
/// Plans are returned in application order: winning bid placement time, then
/// bid id.
pub fn plan_finalization(bids: Vec<Bid>) -> Vec<RiderPlan> {
    let mut by_rider: BTreeMap<RiderId, Vec<Bid>> = BTreeMap::new();
    for bid in bids {
        if matches!(bid.status, BidStatus::Active | BidStatus::Won | BidStatus::Outbid) {
            by_rider.entry(bid.rider_id.clone()).or_default().push(bid);
        }
    }

    let mut plans: Vec<RiderPlan> = by_rider
        .into_iter()
        .map(|(rider_id, group)| {
            let (mut live, outbid): (Vec<Bid>, Vec<Bid>) =
                group.into_iter().partition(|b| b.status != BidStatus::Outbid);
            rank_bids(&mut live);
            let mut rest = live.into_iter();
            let winner = rest.next();
            let (contenders, mut losers): (Vec<Bid>, Vec<Bid>) =
                rest.partition(|b| b.status == BidStatus::Won);
            losers.extend(outbid);
            rank_bids(&mut losers);
            RiderPlan {
                rider_id,
                winner,
                losers,
                contenders,
            }
        })
        .collect();

    plans.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    plans
}

/// One unit of work inside a finalization chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOp {
    /// Mark a non-winning `active` or `outbid` bid `lost`, unless its owner holds the rider.
    MarkLost(Bid),
    /// Re-validate and apply (or cancel) the rider's winner.
    Settle {
        winner: Bid,
        contenders: Vec<Bid>,
        /// Non-winning `active` bids of the rider. Those held by the rider's
        /// roster holder survive `MarkLost` and may be cancelled as duplicates.
        live_losers: usize,
    },
}

impl FinalizeOp {
    /// Upper bound on the number of ledger writes the op performs.
    pub fn weight(&self) -> usize {
        match self {
            FinalizeOp::MarkLost(_) => 1,
            // roster entry + participant cache + winner status + holder bid,
            // plus one per duplicate contender and per extra holder bid
            FinalizeOp::Settle {
                contenders,
                live_losers,
                ..
            } => 4 + contenders.len() + live_losers,
        }
    }
}

/// Flatten plans into ops and pack them into chunks of at most `limit` writes.
///
/// A rider's `MarkLost` ops always precede its `Settle`, so an interrupted run
/// can never commit a settlement while leaving a higher-ranked loser active.
/// A single op heavier than `limit` gets a chunk of its own.
pub fn chunk_ops(plans: Vec<RiderPlan>, limit: usize) -> Vec<Vec<FinalizeOp>> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<FinalizeOp> = Vec::new();
    let mut current_weight = 0usize;

    let ops = plans.into_iter().flat_map(|plan| {
        let live_losers = plan
            .losers
            .iter()
            .filter(|b| b.status == BidStatus::Active)
            .count();
        let settle = plan.winner.map(|winner| FinalizeOp::Settle {
            winner,
            contenders: plan.contenders,
            live_losers,
        });
        plan.losers
            .into_iter()
            .map(FinalizeOp::MarkLost)
            .chain(settle)
    });

    for op in ops {
        let weight = op.weight();
        if !current.is_empty() && current_weight + weight > limit {
            chunks.push(std::mem::take(&mut current));
            current_weight = 0;
        }
        current_weight += weight;
        current.push(op);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Ledger state a settlement is decided against, read inside the chunk transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleContext {
    /// Owner of the rider's active auction roster entry, if any.
    pub holder: Option<UserId>,
    /// The holder's `active`/`won` bids for this rider inside the period window
    /// (only loaded when the holder is not the winner).
    pub holder_bids: Vec<Bid>,
    /// Whether the winner already holds an active entry of any kind for the rider.
    pub winner_has_entry: bool,
    /// Winner's budget; `None` when the participant does not exist.
    pub budget: Option<i64>,
    /// Winner's totals derived from active roster entries.
    pub totals: RosterTotals,
    pub max_riders: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleOutcome {
    /// New roster entry created.
    Awarded,
    /// Winner already held the rider; nothing mutated.
    AlreadyApplied,
    /// Another participant's roster entry won the tie-break.
    Duplicate,
    OverBudget,
    TeamFull,
    /// Already-applied winner removed to bring the roster back under the cap.
    Overflow,
}

/// A bid status change to apply with a conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub bid_id: BidId,
    pub user_id: UserId,
    pub rider_id: RiderId,
    pub amount: i64,
    pub from: BidStatus,
    pub to: BidStatus,
}

impl StatusChange {
    fn of(bid: &Bid, to: BidStatus) -> Option<Self> {
        (bid.status != to && bid.status.can_transition_to(to)).then(|| StatusChange {
            bid_id: bid.id.clone(),
            user_id: bid.user_id.clone(),
            rider_id: bid.rider_id.clone(),
            amount: bid.amount,
            from: bid.status,
            to,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleDecision {
    pub outcome: SettleOutcome,
    pub changes: Vec<StatusChange>,
    /// Create an auction roster entry for the winner at the winner's amount.
    pub award: bool,
    /// Soft-remove the winner's auction roster entry.
    pub release: bool,
}

/// Decide how a rider's winner settles against current ledger state.
pub fn decide_settlement(winner: &Bid, contenders: &[Bid], ctx: &SettleContext) -> SettleDecision {
    let mut changes = Vec::new();
    let mut award = false;
    let mut release = false;

    let outcome = match &ctx.holder {
        Some(holder) if *holder == winner.user_id => {
            if ctx.totals.size > ctx.max_riders {
                release = true;
                changes.extend(StatusChange::of(winner, BidStatus::CancelledOverflow));
                SettleOutcome::Overflow
            } else {
                changes.extend(StatusChange::of(winner, BidStatus::Won));
                SettleOutcome::AlreadyApplied
            }
        }
        Some(holder) => {
            // The existing roster entry is the source of truth: its owner's best
            // bid in the window is the winner, every other claimant is a duplicate.
            let mut holder_bids = ctx.holder_bids.clone();
            rank_bids(&mut holder_bids);
            let mut holder_bids = holder_bids.into_iter();
            if let Some(kept) = holder_bids.next() {
                changes.extend(StatusChange::of(&kept, BidStatus::Won));
            }
            for extra in holder_bids {
                changes.extend(StatusChange::of(&extra, BidStatus::CancelledDuplicate));
            }
            changes.extend(StatusChange::of(winner, BidStatus::CancelledDuplicate));
            tracing::debug!(rider_id = %winner.rider_id, holder = %holder, "Rider already held by another participant");
            SettleOutcome::Duplicate
        }
        None if ctx.winner_has_entry => {
            changes.extend(StatusChange::of(winner, BidStatus::CancelledDuplicate));
            SettleOutcome::Duplicate
        }
        None => match ctx.budget {
            Some(budget) if ctx.totals.spent + winner.amount <= budget => {
                if ctx.totals.size < ctx.max_riders {
                    award = true;
                    changes.extend(StatusChange::of(winner, BidStatus::Won));
                    SettleOutcome::Awarded
                } else {
                    changes.extend(StatusChange::of(winner, BidStatus::CancelledTeamFull));
                    SettleOutcome::TeamFull
                }
            }
            _ => {
                changes.extend(StatusChange::of(winner, BidStatus::CancelledOverBudget));
                SettleOutcome::OverBudget
            }
        },
    };

    for contender in contenders {
        let already_listed = changes.iter().any(|c| c.bid_id == contender.id);
        if !already_listed && Some(&contender.user_id) != ctx.holder.as_ref() {
            changes.extend(StatusChange::of(contender, BidStatus::CancelledDuplicate));
        }
    }

    SettleDecision {
        outcome,
        changes,
        award,
        release,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameId;

    fn bid(id: &str, user: &str, rider: &str, amount: i64, placed_at: i64, status: BidStatus) -> Bid {
        Bid {
            id: BidId::new(id),
            game_id: GameId::new("g"),
            period: "p1".to_string(),
            user_id: UserId::new(user),
            rider_id: RiderId::new(rider),
            amount,
            placed_at: TimeMs::new(placed_at),
            status,
        }
    }

    fn ctx() -> SettleContext {
        SettleContext {
            holder: None,
            holder_bids: vec![],
            winner_has_entry: false,
            budget: Some(1000),
            totals: RosterTotals { spent: 0, size: 0 },
            max_riders: 32,
        }
    }

    #[test]
    fn test_plan_picks_highest_and_splits_losers_and_contenders() {
        let plans = plan_finalization(vec![
            bid("a", "alice", "r1", 100, 1, BidStatus::Active),
            bid("b", "bob", "r1", 150, 2, BidStatus::Active),
            bid("c", "carol", "r1", 120, 3, BidStatus::Won),
            bid("d", "dave", "r1", 500, 4, BidStatus::Lost),
        ]);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].winner.as_ref().map(|w| w.id.clone()), Some(BidId::new("b")));
        assert_eq!(plans[0].losers.len(), 1);
        assert_eq!(plans[0].losers[0].id, BidId::new("a"));
        assert_eq!(plans[0].contenders.len(), 1);
        assert_eq!(plans[0].contenders[0].id, BidId::new("c"));
    }

    #[test]
    fn test_outbid_bids_lose_but_never_win() {
        let plans = plan_finalization(vec![
            bid("a", "alice", "r1", 100, 1, BidStatus::Outbid),
            bid("b", "bob", "r1", 150, 2, BidStatus::Active),
            bid("c", "carol", "r2", 300, 3, BidStatus::Outbid),
            bid("d", "dave", "r2", 200, 4, BidStatus::Outbid),
        ]);
        assert_eq!(plans.len(), 2);
        let r1 = plans.iter().find(|p| p.rider_id == RiderId::new("r1")).unwrap();
        assert_eq!(r1.winner.as_ref().map(|w| w.id.clone()), Some(BidId::new("b")));
        assert_eq!(r1.losers.len(), 1);
        assert_eq!(r1.losers[0].id, BidId::new("a"));

        // r2 has nothing live to award, its bids still resolve to lost
        let r2 = plans.iter().find(|p| p.rider_id == RiderId::new("r2")).unwrap();
        assert!(r2.winner.is_none());
        let losers: Vec<&str> = r2.losers.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(losers, vec!["c", "d"]);

        let ops: Vec<FinalizeOp> = chunk_ops(plans, 100).into_iter().flatten().collect();
        let settles = ops.iter().filter(|op| matches!(op, FinalizeOp::Settle { .. })).count();
        assert_eq!(settles, 1);
        let lost = ops.iter().filter(|op| matches!(op, FinalizeOp::MarkLost(_))).count();
        assert_eq!(lost, 3);
    }

    #[test]
    fn test_settle_weight_counts_live_losers() {
        let plans = plan_finalization(vec![
            bid("a", "alice", "r1", 100, 1, BidStatus::Active),
            bid("b", "bob", "r1", 150, 2, BidStatus::Active),
            bid("c", "carol", "r1", 120, 3, BidStatus::Active),
            bid("d", "dave", "r1", 90, 4, BidStatus::Outbid),
            bid("e", "erin", "r1", 130, 5, BidStatus::Won),
        ]);
        let ops: Vec<FinalizeOp> = chunk_ops(plans, 100).into_iter().flatten().collect();
        let settle = ops.last().unwrap();
        assert!(matches!(
            settle,
            FinalizeOp::Settle { live_losers: 2, contenders, .. } if contenders.len() == 1
        ));
        assert_eq!(settle.weight(), 7);
    }

    #[test]
    fn test_plans_ordered_by_winner_placement() {
        let plans = plan_finalization(vec![
            bid("x", "alice", "r2", 100, 50, BidStatus::Active),
            bid("y", "bob", "r1", 100, 10, BidStatus::Active),
            bid("z", "carol", "r3", 100, 30, BidStatus::Outbid),
        ]);
        let riders: Vec<&str> = plans.iter().map(|p| p.rider_id.as_str()).collect();
        assert_eq!(riders, vec!["r1", "r3", "r2"]);
    }

    #[test]
    fn test_chunking_respects_limit_and_loser_order() {
        let mut bids = Vec::new();
        for i in 0..5 {
            bids.push(bid(&format!("a{}", i), &format!("u{}", i), "r1", 100 + i, i, BidStatus::Active));
        }
        bids.push(bid("b0", "u9", "r2", 10, 100, BidStatus::Active));
        let chunks = chunk_ops(plan_finalization(bids), 10);

        for chunk in &chunks {
            let weight: usize = chunk.iter().map(FinalizeOp::weight).sum();
            assert!(weight <= 10, "chunk weight {} over limit", weight);
        }

        let flat: Vec<FinalizeOp> = chunks.into_iter().flatten().collect();
        // r1: four losers then its settle; r2: settle only
        assert_eq!(flat.len(), 6);
        assert!(flat[..4].iter().all(|op| matches!(op, FinalizeOp::MarkLost(_))));
        assert!(matches!(&flat[4], FinalizeOp::Settle { winner, .. } if winner.id == BidId::new("a4")));
        assert!(matches!(&flat[4], FinalizeOp::Settle { live_losers: 4, .. }));
        assert!(matches!(&flat[5], FinalizeOp::Settle { winner, .. } if winner.id == BidId::new("b0")));
    }

    #[test]
    fn test_oversized_op_gets_own_chunk() {
        let chunks = chunk_ops(
            plan_finalization(vec![bid("a", "alice", "r1", 100, 1, BidStatus::Active)]),
            2,
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
    }

    #[test]
    fn test_settle_awards_when_budget_and_cap_allow() {
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Active);
        let d = decide_settlement(&winner, &[], &ctx());
        assert_eq!(d.outcome, SettleOutcome::Awarded);
        assert!(d.award);
        assert_eq!(d.changes.len(), 1);
        assert_eq!(d.changes[0].to, BidStatus::Won);
    }

    #[test]
    fn test_settle_exact_budget_boundary() {
        let mut c = ctx();
        c.totals.spent = 850;
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Active);
        assert_eq!(decide_settlement(&winner, &[], &c).outcome, SettleOutcome::Awarded);

        let winner = bid("b", "bob", "r1", 151, 2, BidStatus::Active);
        let d = decide_settlement(&winner, &[], &c);
        assert_eq!(d.outcome, SettleOutcome::OverBudget);
        assert!(!d.award);
        assert_eq!(d.changes[0].to, BidStatus::CancelledOverBudget);
    }

    #[test]
    fn test_settle_team_full() {
        let mut c = ctx();
        c.totals.size = 32;
        let winner = bid("b", "bob", "r1", 10, 2, BidStatus::Active);
        let d = decide_settlement(&winner, &[], &c);
        assert_eq!(d.outcome, SettleOutcome::TeamFull);
        assert_eq!(d.changes[0].to, BidStatus::CancelledTeamFull);
    }

    #[test]
    fn test_settle_unknown_participant_is_over_budget() {
        let mut c = ctx();
        c.budget = None;
        let winner = bid("b", "bob", "r1", 10, 2, BidStatus::Active);
        assert_eq!(decide_settlement(&winner, &[], &c).outcome, SettleOutcome::OverBudget);
    }

    #[test]
    fn test_settle_already_applied_is_noop() {
        let mut c = ctx();
        c.holder = Some(UserId::new("bob"));
        c.totals = RosterTotals { spent: 150, size: 1 };
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Won);
        let d = decide_settlement(&winner, &[], &c);
        assert_eq!(d.outcome, SettleOutcome::AlreadyApplied);
        assert!(d.changes.is_empty());
        assert!(!d.award);
    }

    #[test]
    fn test_settle_reset_winner_rejoins_as_won() {
        let mut c = ctx();
        c.holder = Some(UserId::new("bob"));
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Active);
        let d = decide_settlement(&winner, &[], &c);
        assert_eq!(d.outcome, SettleOutcome::AlreadyApplied);
        assert_eq!(d.changes.len(), 1);
        assert_eq!(d.changes[0].to, BidStatus::Won);
        assert!(!d.award);
    }

    #[test]
    fn test_settle_other_holder_makes_winner_duplicate() {
        let mut c = ctx();
        c.holder = Some(UserId::new("carol"));
        c.holder_bids = vec![bid("c", "carol", "r1", 120, 3, BidStatus::Active)];
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Won);
        let contenders = vec![bid("c", "carol", "r1", 120, 3, BidStatus::Active)];
        let d = decide_settlement(&winner, &contenders, &c);

        assert_eq!(d.outcome, SettleOutcome::Duplicate);
        assert!(!d.award);
        let to_of = |id: &str| d.changes.iter().find(|c| c.bid_id == BidId::new(id)).map(|c| c.to);
        assert_eq!(to_of("b"), Some(BidStatus::CancelledDuplicate));
        assert_eq!(to_of("c"), Some(BidStatus::Won));
    }

    #[test]
    fn test_settle_cancels_duplicate_won_contenders() {
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Won);
        let contenders = vec![bid("c", "carol", "r1", 120, 3, BidStatus::Won)];
        let d = decide_settlement(&winner, &contenders, &ctx());
        assert_eq!(d.outcome, SettleOutcome::Awarded);
        let dup = d.changes.iter().find(|c| c.bid_id == BidId::new("c")).unwrap();
        assert_eq!(dup.to, BidStatus::CancelledDuplicate);
    }

    #[test]
    fn test_settle_overflow_releases_applied_winner() {
        let mut c = ctx();
        c.holder = Some(UserId::new("bob"));
        c.max_riders = 2;
        c.totals = RosterTotals { spent: 300, size: 3 };
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Won);
        let d = decide_settlement(&winner, &[], &c);
        assert_eq!(d.outcome, SettleOutcome::Overflow);
        assert!(d.release);
        assert_eq!(d.changes[0].to, BidStatus::CancelledOverflow);
    }

    #[test]
    fn test_settle_winner_holding_selection_entry_is_duplicate() {
        let mut c = ctx();
        c.winner_has_entry = true;
        let winner = bid("b", "bob", "r1", 150, 2, BidStatus::Active);
        let d = decide_settlement(&winner, &[], &c);
        assert_eq!(d.outcome, SettleOutcome::Duplicate);
        assert!(!d.award);
    }
}
