use crate::domain::{AuctionPeriod, PeriodStatus, TimeMs};

/// Time-driven status of a period.
///
/// Pending opens at `start`, pending or active closes once `now` passes `end`.
/// Closed and finalized never move on time alone.
pub fn advance_status(period: &AuctionPeriod, now: TimeMs) -> PeriodStatus {
    match period.status {
        PeriodStatus::Pending | PeriodStatus::Active if now > period.end => PeriodStatus::Closed,
        PeriodStatus::Pending if now >= period.start => PeriodStatus::Active,
        status => status,
    }
}

/// Whether a scheduler tick at `now` should run finalization for this period.
pub fn finalization_due(period: &AuctionPeriod, now: TimeMs) -> bool {
    period.status == PeriodStatus::Closed && now >= period.finalize_at
}
