//! Participant standing and its derived roster totals.

use crate::domain::{GameId, UserId};
use serde::{Deserialize, Serialize};

/// One user's standing in one game.
///
/// `spent_budget` and `roster_size` are caches re-derived from active roster
/// entries on every roster write; they are never incremented in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub game_id: GameId,
    pub user_id: UserId,
    pub budget: i64,
    pub spent_budget: i64,
    pub roster_size: i64,
}

impl Participant {
    pub fn remaining_budget(&self) -> i64 {
        self.budget - self.spent_budget
    }

    pub fn roster_complete(&self, max_riders: i64) -> bool {
        self.roster_size >= max_riders
    }
}

/// Totals derived from a participant's active roster entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterTotals {
    pub spent: i64,
    pub size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_and_complete() {
        let p = Participant {
            game_id: GameId::new("g"),
            user_id: UserId::new("u"),
            budget: 1000,
            spent_budget: 400,
            roster_size: 32,
        };
        assert_eq!(p.remaining_budget(), 600);
        assert!(p.roster_complete(32));
        assert!(!p.roster_complete(33));
    }
}
