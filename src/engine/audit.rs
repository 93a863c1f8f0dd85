//! Cross-checks between the Bid, RosterEntry, and Participant views.

use crate::domain::{AcquisitionType, Bid, BidId, BidStatus, GameId, Participant, RiderId, RosterEntry, UserId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A detected mismatch between views that should agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    pub game_id: GameId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider_id: Option<RiderId>,
    #[serde(flatten)]
    pub kind: DivergenceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DivergenceKind {
    /// A `won` bid with no matching active auction roster entry.
    WonBidWithoutRoster { bid_id: BidId, amount: i64 },
    /// A `won` bid whose roster entry carries a different price.
    PriceMismatch {
        bid_id: BidId,
        amount: i64,
        price_paid: i64,
    },
    /// An active auction roster entry with no `won` bid behind it.
    RosterWithoutWonBid { entry_id: i64, price_paid: i64 },
    /// More than one `won` bid backs the same participant's roster entry.
    MultipleWonBids { bid_ids: Vec<BidId> },
    /// Several participants hold `won` bids for one rider.
    DuplicateWinner { user_ids: Vec<UserId> },
    /// Several active auction roster entries for one rider.
    DuplicateOwner { entry_ids: Vec<i64> },
    /// Active roster entries for a user with no participant record.
    MissingParticipant { roster_size: i64 },
    SpentBudgetDrift { cached: i64, derived: i64 },
    RosterSizeDrift { cached: i64, derived: i64 },
    RosterOverCap { roster_size: i64, max_riders: i64 },
    BudgetOverdrawn { spent: i64, budget: i64 },
}

impl DivergenceKind {
    pub fn code(&self) -> &'static str {
        match self {
            DivergenceKind::WonBidWithoutRoster { .. } => "won_bid_without_roster",
            DivergenceKind::PriceMismatch { .. } => "price_mismatch",
            DivergenceKind::RosterWithoutWonBid { .. } => "roster_without_won_bid",
            DivergenceKind::MultipleWonBids { .. } => "multiple_won_bids",
            DivergenceKind::DuplicateWinner { .. } => "duplicate_winner",
            DivergenceKind::DuplicateOwner { .. } => "duplicate_owner",
            DivergenceKind::MissingParticipant { .. } => "missing_participant",
            DivergenceKind::SpentBudgetDrift { .. } => "spent_budget_drift",
            DivergenceKind::RosterSizeDrift { .. } => "roster_size_drift",
            DivergenceKind::RosterOverCap { .. } => "roster_over_cap",
            DivergenceKind::BudgetOverdrawn { .. } => "budget_overdrawn",
        }
    }

    /// Cache drift is the only kind the repair command fixes mechanically.
    pub fn is_cache_drift(&self) -> bool {
        matches!(
            self,
            DivergenceKind::SpentBudgetDrift { .. } | DivergenceKind::RosterSizeDrift { .. }
        )
    }
}

/// Everything the audit reads; callers load it from the ledger.
#[derive(Debug, Clone, Copy)]
pub struct AuditInput<'a> {
    pub game_id: &'a GameId,
    /// All bids with status `won`.
    pub won_bids: &'a [Bid],
    /// All active roster entries.
    pub roster: &'a [RosterEntry],
    pub participants: &'a [Participant],
    pub max_riders: i64,
}

/// Run every cross-check. Output is sorted by user, rider, then kind code.
pub fn audit(input: AuditInput<'_>) -> Vec<Divergence> {
    let game = input.game_id;
    let mut out = Vec::new();
    let divergence = |user: Option<&UserId>, rider: Option<&RiderId>, kind| Divergence {
        game_id: game.clone(),
        user_id: user.cloned(),
        rider_id: rider.cloned(),
        kind,
    };

    let active: Vec<&RosterEntry> = input.roster.iter().filter(|e| e.active).collect();
    let won: Vec<&Bid> = input
        .won_bids
        .iter()
        .filter(|b| b.status == BidStatus::Won)
        .collect();

    let mut auction_by_owner: BTreeMap<(&UserId, &RiderId), Vec<&RosterEntry>> = BTreeMap::new();
    let mut auction_by_rider: BTreeMap<&RiderId, Vec<&RosterEntry>> = BTreeMap::new();
    for entry in active.iter().filter(|e| e.acquisition == AcquisitionType::Auction) {
        auction_by_owner
            .entry((&entry.user_id, &entry.rider_id))
            .or_default()
            .push(*entry);
        auction_by_rider.entry(&entry.rider_id).or_default().push(*entry);
    }

    let mut won_by_owner: BTreeMap<(&UserId, &RiderId), Vec<&Bid>> = BTreeMap::new();
    let mut won_by_rider: BTreeMap<&RiderId, BTreeSet<&UserId>> = BTreeMap::new();
    for bid in &won {
        won_by_owner
            .entry((&bid.user_id, &bid.rider_id))
            .or_default()
            .push(*bid);
        won_by_rider.entry(&bid.rider_id).or_default().insert(&bid.user_id);
    }

    // (a) every won bid has exactly one matching entry at the same price
    for bid in &won {
        match auction_by_owner.get(&(&bid.user_id, &bid.rider_id)) {
            None => out.push(divergence(
                Some(&bid.user_id),
                Some(&bid.rider_id),
                DivergenceKind::WonBidWithoutRoster {
                    bid_id: bid.id.clone(),
                    amount: bid.amount,
                },
            )),
            Some(entries) => {
                if let Some(entry) = entries.iter().find(|e| e.price_paid != bid.amount) {
                    out.push(divergence(
                        Some(&bid.user_id),
                        Some(&bid.rider_id),
                        DivergenceKind::PriceMismatch {
                            bid_id: bid.id.clone(),
                            amount: bid.amount,
                            price_paid: entry.price_paid,
                        },
                    ));
                }
            }
        }
    }

    // (b) every active auction entry has exactly one won bid
    for ((user, rider), entries) in &auction_by_owner {
        match won_by_owner.get(&(*user, *rider)) {
            None => {
                for entry in entries {
                    out.push(divergence(
                        Some(*user),
                        Some(*rider),
                        DivergenceKind::RosterWithoutWonBid {
                            entry_id: entry.id,
                            price_paid: entry.price_paid,
                        },
                    ));
                }
            }
            Some(bids) if bids.len() > 1 => {
                let mut bid_ids: Vec<BidId> = bids.iter().map(|b| b.id.clone()).collect();
                bid_ids.sort();
                out.push(divergence(
                    Some(*user),
                    Some(*rider),
                    DivergenceKind::MultipleWonBids { bid_ids },
                ));
            }
            Some(_) => {}
        }
    }

    // rider-level uniqueness
    for (rider, users) in &won_by_rider {
        if users.len() > 1 {
            out.push(divergence(
                None,
                Some(*rider),
                DivergenceKind::DuplicateWinner {
                    user_ids: users.iter().map(|u| (*u).clone()).collect(),
                },
            ));
        }
    }
    for (rider, entries) in &auction_by_rider {
        if entries.len() > 1 {
            let mut entry_ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
            entry_ids.sort_unstable();
            out.push(divergence(
                None,
                Some(*rider),
                DivergenceKind::DuplicateOwner { entry_ids },
            ));
        }
    }

    // (c) caches equal what the roster derives
    let mut derived: BTreeMap<&UserId, (i64, i64)> = BTreeMap::new();
    for entry in &active {
        let totals = derived.entry(&entry.user_id).or_default();
        totals.0 += entry.price_paid;
        totals.1 += 1;
    }

    let known: BTreeSet<&UserId> = input.participants.iter().map(|p| &p.user_id).collect();
    for (user, (_, size)) in &derived {
        if !known.contains(user) {
            out.push(divergence(
                Some(*user),
                None,
                DivergenceKind::MissingParticipant { roster_size: *size },
            ));
        }
    }

    for p in input.participants {
        let (spent, size) = derived.get(&p.user_id).copied().unwrap_or((0, 0));
        let user = Some(&p.user_id);
        if p.spent_budget != spent {
            out.push(divergence(
                user,
                None,
                DivergenceKind::SpentBudgetDrift {
                    cached: p.spent_budget,
                    derived: spent,
                },
            ));
        }
        if p.roster_size != size {
            out.push(divergence(
                user,
                None,
                DivergenceKind::RosterSizeDrift {
                    cached: p.roster_size,
                    derived: size,
                },
            ));
        }
        if size > input.max_riders {
            out.push(divergence(
                user,
                None,
                DivergenceKind::RosterOverCap {
                    roster_size: size,
                    max_riders: input.max_riders,
                },
            ));
        }
        if spent > p.budget {
            out.push(divergence(
                user,
                None,
                DivergenceKind::BudgetOverdrawn {
                    spent,
                    budget: p.budget,
                },
            ));
        }
    }

    out.sort_by(|a, b| {
        (&a.user_id, &a.rider_id, a.kind.code()).cmp(&(&b.user_id, &b.rider_id, b.kind.code()))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeMs;

    fn game() -> GameId {
        GameId::new("g")
    }

    fn won(id: &str, user: &str, rider: &str, amount: i64) -> Bid {
        Bid {
            id: BidId::new(id),
            game_id: game(),
            period: "p1".to_string(),
            user_id: UserId::new(user),
            rider_id: RiderId::new(rider),
            amount,
            placed_at: TimeMs::new(1),
            status: BidStatus::Won,
        }
    }

    fn entry(id: i64, user: &str, rider: &str, price: i64, acquisition: AcquisitionType) -> RosterEntry {
        RosterEntry {
            id,
            game_id: game(),
            user_id: UserId::new(user),
            rider_id: RiderId::new(rider),
            acquisition,
            price_paid: price,
            acquired_at: TimeMs::new(2),
            active: true,
        }
    }

    fn participant(user: &str, budget: i64, spent: i64, size: i64) -> Participant {
        Participant {
            game_id: game(),
            user_id: UserId::new(user),
            budget,
            spent_budget: spent,
            roster_size: size,
        }
    }

    fn run(bids: &[Bid], roster: &[RosterEntry], participants: &[Participant]) -> Vec<Divergence> {
        let g = game();
        audit(AuditInput {
            game_id: &g,
            won_bids: bids,
            roster,
            participants,
            max_riders: 2,
        })
    }

    #[test]
    fn test_consistent_ledger_has_no_divergence() {
        let bids = [won("b1", "alice", "r1", 100)];
        let roster = [
            entry(1, "alice", "r1", 100, AcquisitionType::Auction),
            entry(2, "alice", "r2", 40, AcquisitionType::Selection),
        ];
        let participants = [participant("alice", 1000, 140, 2)];
        assert!(run(&bids, &roster, &participants).is_empty());
    }

    #[test]
    fn test_won_bid_without_roster_entry() {
        let bids = [won("b1", "alice", "r1", 100)];
        let participants = [participant("alice", 1000, 0, 0)];
        let out = run(&bids, &[], &participants);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind.code(), "won_bid_without_roster");
        assert_eq!(out[0].rider_id, Some(RiderId::new("r1")));
    }

    #[test]
    fn test_price_mismatch_and_roster_without_bid() {
        let bids = [won("b1", "alice", "r1", 100)];
        let roster = [
            entry(1, "alice", "r1", 90, AcquisitionType::Auction),
            entry(2, "alice", "r2", 50, AcquisitionType::Auction),
        ];
        let participants = [participant("alice", 1000, 140, 2)];
        let codes: Vec<&str> = run(&bids, &roster, &participants)
            .iter()
            .map(|d| d.kind.code())
            .collect();
        assert_eq!(codes, vec!["price_mismatch", "roster_without_won_bid"]);
    }

    #[test]
    fn test_duplicate_winners_across_users() {
        let bids = [won("b1", "alice", "r1", 100), won("b2", "bob", "r1", 90)];
        let roster = [entry(1, "alice", "r1", 100, AcquisitionType::Auction)];
        let participants = [participant("alice", 1000, 100, 1), participant("bob", 1000, 0, 0)];
        let out = run(&bids, &roster, &participants);
        let codes: Vec<&str> = out.iter().map(|d| d.kind.code()).collect();
        assert!(codes.contains(&"duplicate_winner"));
        assert!(codes.contains(&"won_bid_without_roster"));
    }

    #[test]
    fn test_cache_drift_and_caps() {
        let roster = [
            entry(1, "alice", "r1", 600, AcquisitionType::Selection),
            entry(2, "alice", "r2", 600, AcquisitionType::Selection),
            entry(3, "alice", "r3", 600, AcquisitionType::Selection),
        ];
        let participants = [participant("alice", 1000, 1200, 2)];
        let out = run(&[], &roster, &participants);
        let codes: BTreeSet<&str> = out.iter().map(|d| d.kind.code()).collect();
        assert_eq!(
            codes,
            ["budget_overdrawn", "roster_over_cap", "roster_size_drift", "spent_budget_drift"]
                .into_iter()
                .collect()
        );
        let drift = out.iter().find(|d| d.kind.is_cache_drift()).unwrap();
        assert_eq!(drift.user_id, Some(UserId::new("alice")));
    }

    #[test]
    fn test_missing_participant() {
        let roster = [entry(1, "ghost", "r1", 10, AcquisitionType::Selection)];
        let out = run(&[], &roster, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, DivergenceKind::MissingParticipant { roster_size: 1 });
    }

    #[test]
    fn test_divergence_serializes_flat_with_kind_tag() {
        let d = Divergence {
            game_id: game(),
            user_id: Some(UserId::new("alice")),
            rider_id: None,
            kind: DivergenceKind::SpentBudgetDrift {
                cached: 10,
                derived: 12,
            },
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "spent_budget_drift");
        assert_eq!(json["gameId"], "g");
        assert_eq!(json["cached"], 10);
        assert!(json.get("riderId").is_none());
    }
}
