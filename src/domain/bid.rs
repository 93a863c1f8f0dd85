//! Bid record and its status state machine.

use crate::domain::{BidId, GameId, RiderId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// One participant's offer for one rider within one auction period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub game_id: GameId,
    /// Name of the auction period whose window contains `placed_at`.
    pub period: String,
    pub user_id: UserId,
    pub rider_id: RiderId,
    /// Positive amount in the game's currency unit.
    pub amount: i64,
    pub placed_at: TimeMs,
    pub status: BidStatus,
}

impl Bid {
    /// Create a new bid in the `active` state with a fresh id.
    pub fn new(
        game_id: GameId,
        period: String,
        user_id: UserId,
        rider_id: RiderId,
        amount: i64,
        placed_at: TimeMs,
    ) -> Self {
        Self {
            id: BidId::generate(),
            game_id,
            period,
            user_id,
            rider_id,
            amount,
            placed_at,
            status: BidStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Active,
    Outbid,
    Won,
    Lost,
    CancelledTeamFull,
    CancelledOverBudget,
    CancelledDuplicate,
    CancelledOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal bid transition {from} -> {to}")]
pub struct BidTransitionError {
    pub from: BidStatus,
    pub to: BidStatus,
}

impl BidStatus {
    pub const ALL: [BidStatus; 8] = [
        BidStatus::Active,
        BidStatus::Outbid,
        BidStatus::Won,
        BidStatus::Lost,
        BidStatus::CancelledTeamFull,
        BidStatus::CancelledOverBudget,
        BidStatus::CancelledDuplicate,
        BidStatus::CancelledOverflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Active => "active",
            BidStatus::Outbid => "outbid",
            BidStatus::Won => "won",
            BidStatus::Lost => "lost",
            BidStatus::CancelledTeamFull => "cancelled_team_full",
            BidStatus::CancelledOverBudget => "cancelled_over_budget",
            BidStatus::CancelledDuplicate => "cancelled_duplicate",
            BidStatus::CancelledOverflow => "cancelled_overflow",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BidStatus::CancelledTeamFull
                | BidStatus::CancelledOverBudget
                | BidStatus::CancelledDuplicate
                | BidStatus::CancelledOverflow
        )
    }

    /// Statuses a period reopen with `resetBids` puts back to `active`.
    pub fn is_resettable(&self) -> bool {
        *self == BidStatus::Won || self.is_cancelled()
    }

    /// Transition table.
    ///
    /// Staying in the same state is always allowed so that idempotent
    /// re-runs never fail on already-applied outcomes.
    pub fn can_transition_to(&self, next: BidStatus) -> bool {
        use BidStatus::*;
        if *self == next {
            return true;
        }
        match (self, next) {
            // intake
            (Active, Outbid) => true,
            // finalization
            (Active, Won | Lost) => true,
            (Outbid, Lost) => true,
            (Active, s) if s.is_cancelled() => true,
            // re-validation of an earlier win
            (Won, s) if s.is_cancelled() => true,
            // reopen reset
            (s, Active) if s.is_resettable() => true,
            _ => false,
        }
    }

    pub fn transition(self, next: BidStatus) -> Result<BidStatus, BidTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BidTransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BidStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BidStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown bid status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for status in BidStatus::ALL {
            assert_eq!(BidStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(BidStatus::from_str("pending").is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&BidStatus::CancelledOverBudget).unwrap();
        assert_eq!(json, "\"cancelled_over_budget\"");
    }

    #[test]
    fn test_intake_and_finalize_transitions_allowed() {
        assert!(BidStatus::Active.can_transition_to(BidStatus::Outbid));
        assert!(BidStatus::Active.can_transition_to(BidStatus::Won));
        assert!(BidStatus::Active.can_transition_to(BidStatus::Lost));
        assert!(BidStatus::Active.can_transition_to(BidStatus::CancelledTeamFull));
        assert!(BidStatus::Won.can_transition_to(BidStatus::CancelledDuplicate));
        assert!(BidStatus::Won.can_transition_to(BidStatus::CancelledOverBudget));
        assert!(BidStatus::Won.can_transition_to(BidStatus::Won));
    }

    #[test]
    fn test_terminal_states_only_leave_through_reset() {
        assert!(!BidStatus::Outbid.can_transition_to(BidStatus::Active));
        assert!(BidStatus::Outbid.can_transition_to(BidStatus::Lost));
        assert!(!BidStatus::Lost.can_transition_to(BidStatus::Active));
        assert!(!BidStatus::Lost.can_transition_to(BidStatus::Won));
        assert!(!BidStatus::Won.can_transition_to(BidStatus::Lost));
        assert!(BidStatus::Won.can_transition_to(BidStatus::Active));
        assert!(BidStatus::CancelledOverflow.can_transition_to(BidStatus::Active));
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = BidStatus::Outbid.transition(BidStatus::Won).unwrap_err();
        assert_eq!(err.to_string(), "illegal bid transition outbid -> won");
    }
}
