//! Canonical digest of ledger state.

use crate::domain::{Bid, Participant, RosterEntry};
use sha2::{Digest, Sha256};

fn hash_var(hasher: &mut Sha256, data: &str) {
    hasher.update((data.len() as u32).to_le_bytes());
    hasher.update(data.as_bytes());
}

/// SHA-256 over the canonical Bid/RosterEntry/Participant state of one game.
///
/// Covers ids, statuses, amounts, prices, flags, and caches. Timestamps and
/// roster surrogate keys are excluded, so two ledgers that reached the same
/// state through different run histories digest identically.
pub fn ledger_digest(bids: &[Bid], roster: &[RosterEntry], participants: &[Participant]) -> String {
    let mut hasher = Sha256::new();

    let mut bids: Vec<&Bid> = bids.iter().collect();
    bids.sort_by(|a, b| a.id.cmp(&b.id));
    hasher.update(b"bids");
    for bid in bids {
        hash_var(&mut hasher, bid.id.as_str());
        hash_var(&mut hasher, bid.user_id.as_str());
        hash_var(&mut hasher, bid.rider_id.as_str());
        hasher.update(bid.amount.to_le_bytes());
        hash_var(&mut hasher, bid.status.as_str());
    }

    let mut roster: Vec<&RosterEntry> = roster.iter().collect();
    roster.sort_by(|a, b| {
        (&a.user_id, &a.rider_id, a.acquisition.as_str(), a.price_paid, a.active).cmp(&(
            &b.user_id,
            &b.rider_id,
            b.acquisition.as_str(),
            b.price_paid,
            b.active,
        ))
    });
    hasher.update(b"roster");
    for entry in roster {
        hash_var(&mut hasher, entry.user_id.as_str());
        hash_var(&mut hasher, entry.rider_id.as_str());
        hash_var(&mut hasher, entry.acquisition.as_str());
        hasher.update(entry.price_paid.to_le_bytes());
        hasher.update([entry.active as u8]);
    }

    let mut participants: Vec<&Participant> = participants.iter().collect();
    participants.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    hasher.update(b"participants");
    for p in participants {
        hash_var(&mut hasher, p.user_id.as_str());
        hasher.update(p.budget.to_le_bytes());
        hasher.update(p.spent_budget.to_le_bytes());
        hasher.update(p.roster_size.to_le_bytes());
    }

    hex::encode(hasher.finalize())
}
