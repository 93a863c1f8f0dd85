//! Placement decision for an incoming bid against a rider's live bids.

use crate::domain::{Bid, BidId, BidOrderingKey, BidStatus};

/// How an incoming bid lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Status the new bid is inserted with.
    pub status: BidStatus,
    /// Live bids the new bid displaces, to be moved to `outbid` in the same write.
    pub outbid: Vec<BidId>,
}

/// Decide the placement of `incoming` given the rider's currently `active` bids.
///
/// The incoming bid becomes the live bid only if it outranks every active bid
/// (amount, then placement time, then id). Otherwise it is recorded as
/// already `outbid`.
pub fn place(current_active: &[Bid], incoming: &Bid) -> Placement {
    let outranks_all = current_active
        .iter()
        .all(|live| BidOrderingKey::outranks(incoming, live));

    if outranks_all {
        Placement {
            status: BidStatus::Active,
            outbid: current_active.iter().map(|b| b.id.clone()).collect(),
        }
    } else {
        Placement {
            status: BidStatus::Outbid,
            outbid: Vec::new(),
        }
    }
}
