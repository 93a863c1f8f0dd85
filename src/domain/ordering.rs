//! Stable bid ranking for deterministic winner selection.

use crate::domain::Bid;
use std::cmp::Reverse;

/// Stable ordering key for bids on the same rider.
///
/// Smaller keys rank higher. Ordering: amount (desc) -> placed_at (asc) -> bid id (asc).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BidOrderingKey {
    /// Amount, reversed so the highest bid sorts first.
    pub amount: Reverse<i64>,
    /// Placement time (earliest wins a tie).
    pub placed_at_ms: i64,
    /// Bid id (total order fallback).
    pub bid_id: String,
}

impl BidOrderingKey {
    pub fn from_bid(bid: &Bid) -> Self {
        BidOrderingKey {
            amount: Reverse(bid.amount),
            placed_at_ms: bid.placed_at.as_ms(),
            bid_id: bid.id.as_str().to_string(),
        }
    }

    /// Returns true if `a` outranks `b`.
    pub fn outranks(a: &Bid, b: &Bid) -> bool {
        Self::from_bid(a) < Self::from_bid(b)
    }
}

/// Sort bids best-first.
pub fn rank_bids(bids: &mut [Bid]) {
    bids.sort_by_cached_key(BidOrderingKey::from_bid);
}
