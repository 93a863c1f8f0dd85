//! Auction period window and lifecycle status.

use crate::domain::{GameId, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A named bidding window belonging to a game's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionPeriod {
    pub game_id: GameId,
    pub name: String,
    pub start: TimeMs,
    pub end: TimeMs,
    pub finalize_at: TimeMs,
    pub status: PeriodStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodWindowError {
    #[error("period {name}: end {end} precedes start {start}")]
    EndBeforeStart { name: String, start: TimeMs, end: TimeMs },
    #[error("period {name}: finalize {finalize_at} precedes end {end}")]
    FinalizeBeforeEnd {
        name: String,
        end: TimeMs,
        finalize_at: TimeMs,
    },
}

impl AuctionPeriod {
    /// Build a `pending` period, enforcing `finalize_at >= end >= start`.
    pub fn new(
        game_id: GameId,
        name: impl Into<String>,
        start: TimeMs,
        end: TimeMs,
        finalize_at: TimeMs,
    ) -> Result<Self, PeriodWindowError> {
        let name = name.into();
        if end < start {
            return Err(PeriodWindowError::EndBeforeStart { name, start, end });
        }
        if finalize_at < end {
            return Err(PeriodWindowError::FinalizeBeforeEnd {
                name,
                end,
                finalize_at,
            });
        }
        Ok(Self {
            game_id,
            name,
            start,
            end,
            finalize_at,
            status: PeriodStatus::Pending,
        })
    }

    /// Whether `t` falls inside the inclusive `[start, end]` window.
    pub fn contains(&self, t: TimeMs) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Pending,
    Active,
    Closed,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal period transition {from} -> {to}")]
pub struct PeriodTransitionError {
    pub from: PeriodStatus,
    pub to: PeriodStatus,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Pending => "pending",
            PeriodStatus::Active => "active",
            PeriodStatus::Closed => "closed",
            PeriodStatus::Finalized => "finalized",
        }
    }

    /// Forward transitions driven by time and finalization.
    pub fn can_advance_to(&self, next: PeriodStatus) -> bool {
        use PeriodStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Closed) | (Active, Closed) | (Closed, Finalized)
        )
    }

    /// The administrative reopen: finalized|closed -> closed.
    pub fn can_reopen(&self) -> bool {
        matches!(self, PeriodStatus::Finalized | PeriodStatus::Closed)
    }

    pub fn advance(self, next: PeriodStatus) -> Result<PeriodStatus, PeriodTransitionError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(PeriodTransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PeriodStatus::Pending),
            "active" => Ok(PeriodStatus::Active),
            "closed" => Ok(PeriodStatus::Closed),
            "finalized" => Ok(PeriodStatus::Finalized),
            other => Err(format!("unknown period status: {}", other)),
        }
    }
}
