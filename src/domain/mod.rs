//! Domain types for the rider auction ledger.
//!
//! This module provides:
//! - The canonical instant type (`TimeMs`) and string identifiers
//! - Bid, AuctionPeriod, Participant, and RosterEntry records
//! - Explicit status state machines with transition tables
//! - Stable bid ranking for deterministic winner selection

pub mod bid;
pub mod ordering;
pub mod participant;
pub mod period;
pub mod primitives;
pub mod roster;

pub use bid::{Bid, BidStatus, BidTransitionError};
pub use ordering::{rank_bids, BidOrderingKey};
pub use participant::{Participant, RosterTotals};
pub use period::{AuctionPeriod, PeriodStatus, PeriodTransitionError, PeriodWindowError};
pub use primitives::{BidId, GameId, RiderId, TimeMs, UserId};
pub use roster::{AcquisitionType, RosterEntry};
