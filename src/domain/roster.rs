//! Roster entries: durable rider ownership records.

use crate::domain::{GameId, RiderId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a rider ended up on a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionType {
    /// Won through an auction period.
    Auction,
    /// Picked directly by the participant (no bid).
    Selection,
}

impl AcquisitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionType::Auction => "auction",
            AcquisitionType::Selection => "selection",
        }
    }
}

impl std::fmt::Display for AcquisitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcquisitionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auction" => Ok(AcquisitionType::Auction),
            "selection" => Ok(AcquisitionType::Selection),
            other => Err(format!("unknown acquisition type: {}", other)),
        }
    }
}

/// One rider acquired by one participant. Soft-removed entries keep
/// `active = false` for audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: i64,
    pub game_id: GameId,
    pub user_id: UserId,
    pub rider_id: RiderId,
    pub acquisition: AcquisitionType,
    pub price_paid: i64,
    pub acquired_at: TimeMs,
    pub active: bool,
}
