//! Repository layer for ledger operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by entity:
//! - `bids.rs` - Bid reads, the per-rider version CAS, and reopen resets
//! - `periods.rs` - Auction period definitions and status transitions
//! - `roster.rs` - Roster entry reads and selection acquisitions/releases
//! - `finalization.rs` - Chunked transactional finalization commits
//!
//! Participant caches are only ever written by `refresh_participant_totals`,
//! which recomputes them from active roster entries.

mod bids;
mod finalization;
mod periods;
mod roster;

pub use bids::{BidCommit, BidQuery, RiderSnapshot};
pub use finalization::{ChunkResult, Settlement};
pub use roster::RosterQuery;

use crate::domain::{
    AcquisitionType, AuctionPeriod, Bid, BidId, BidStatus, GameId, Participant, PeriodStatus,
    RiderId, RosterEntry, RosterTotals, TimeMs, UserId,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for ledger operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Participant operations
    // =========================================================================

    /// Register a participant or update its budget.
    ///
    /// Caches are recomputed from the roster in the same transaction, so a
    /// participant registered after roster entries already exist starts
    /// consistent.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn upsert_participant(
        &self,
        game_id: &GameId,
        user_id: &UserId,
        budget: i64,
    ) -> Result<Participant, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO participants (game_id, user_id, budget, spent_budget, roster_size)
            VALUES (?, ?, ?, 0, 0)
            ON CONFLICT(game_id, user_id) DO UPDATE SET budget = excluded.budget
            "#,
        )
        .bind(game_id.as_str())
        .bind(user_id.as_str())
        .bind(budget)
        .execute(&mut *tx)
        .await?;

        refresh_participant_totals(&mut tx, game_id, user_id).await?;
        let participant = fetch_participant(&mut tx, game_id, user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        tx.commit().await?;
        Ok(participant)
    }

    pub async fn get_participant(
        &self,
        game_id: &GameId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_participant(&mut conn, game_id, user_id).await
    }

    /// All participants of a game, ordered by user id.
    pub async fn list_participants(&self, game_id: &GameId) -> Result<Vec<Participant>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT game_id, user_id, budget, spent_budget, roster_size
            FROM participants
            WHERE game_id = ?
            ORDER BY user_id ASC
            "#,
        )
        .bind(game_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(participant_from_row).collect()
    }

    /// Recompute one participant's caches from its active roster entries.
    ///
    /// Returns false when the participant does not exist.
    pub async fn refresh_participant(
        &self,
        game_id: &GameId,
        user_id: &UserId,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let updated = refresh_participant_totals(&mut tx, game_id, user_id).await?;
        tx.commit().await?;
        Ok(updated)
    }
}

/// The single cache-update routine: recompute `spent_budget` and `roster_size`
/// from active roster entries. Every roster mutation calls this inside its own
/// transaction.
pub(crate) async fn refresh_participant_totals(
    conn: &mut SqliteConnection,
    game_id: &GameId,
    user_id: &UserId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE participants SET
            spent_budget = (
                SELECT COALESCE(SUM(price_paid), 0) FROM roster_entries
                WHERE game_id = ? AND user_id = ? AND active = 1
            ),
            roster_size = (
                SELECT COUNT(*) FROM roster_entries
                WHERE game_id = ? AND user_id = ? AND active = 1
            )
        WHERE game_id = ? AND user_id = ?
        "#,
    )
    .bind(game_id.as_str())
    .bind(user_id.as_str())
    .bind(game_id.as_str())
    .bind(user_id.as_str())
    .bind(game_id.as_str())
    .bind(user_id.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Totals derived from active roster entries, ignoring the cached columns.
pub(crate) async fn derived_totals(
    conn: &mut SqliteConnection,
    game_id: &GameId,
    user_id: &UserId,
) -> Result<RosterTotals, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(price_paid), 0) AS spent, COUNT(*) AS size
        FROM roster_entries
        WHERE game_id = ? AND user_id = ? AND active = 1
        "#,
    )
    .bind(game_id.as_str())
    .bind(user_id.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(RosterTotals {
        spent: row.try_get("spent")?,
        size: row.try_get("size")?,
    })
}

pub(crate) async fn fetch_participant(
    conn: &mut SqliteConnection,
    game_id: &GameId,
    user_id: &UserId,
) -> Result<Option<Participant>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT game_id, user_id, budget, spent_budget, roster_size
        FROM participants
        WHERE game_id = ? AND user_id = ?
        "#,
    )
    .bind(game_id.as_str())
    .bind(user_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(participant_from_row).transpose()
}

// =============================================================================
// Row mapping
// =============================================================================

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

pub(crate) fn bid_from_row(row: &SqliteRow) -> Result<Bid, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Bid {
        id: BidId::new(row.try_get::<String, _>("id")?),
        game_id: GameId::new(row.try_get::<String, _>("game_id")?),
        period: row.try_get("period")?,
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        rider_id: RiderId::new(row.try_get::<String, _>("rider_id")?),
        amount: row.try_get("amount")?,
        placed_at: TimeMs::new(row.try_get("placed_at_ms")?),
        status: BidStatus::from_str(&status).map_err(|e| decode_error("status", e))?,
    })
}

pub(crate) fn period_from_row(row: &SqliteRow) -> Result<AuctionPeriod, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(AuctionPeriod {
        game_id: GameId::new(row.try_get::<String, _>("game_id")?),
        name: row.try_get("name")?,
        start: TimeMs::new(row.try_get("start_ms")?),
        end: TimeMs::new(row.try_get("end_ms")?),
        finalize_at: TimeMs::new(row.try_get("finalize_ms")?),
        status: PeriodStatus::from_str(&status).map_err(|e| decode_error("status", e))?,
    })
}

pub(crate) fn roster_entry_from_row(row: &SqliteRow) -> Result<RosterEntry, sqlx::Error> {
    let acquisition: String = row.try_get("acquisition_type")?;
    Ok(RosterEntry {
        id: row.try_get("id")?,
        game_id: GameId::new(row.try_get::<String, _>("game_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        rider_id: RiderId::new(row.try_get::<String, _>("rider_id")?),
        acquisition: AcquisitionType::from_str(&acquisition)
            .map_err(|e| decode_error("acquisition_type", e))?,
        price_paid: row.try_get("price_paid")?,
        acquired_at: TimeMs::new(row.try_get("acquired_at_ms")?),
        active: row.try_get::<i64, _>("active")? != 0,
    })
}

fn participant_from_row(row: &SqliteRow) -> Result<Participant, sqlx::Error> {
    Ok(Participant {
        game_id: GameId::new(row.try_get::<String, _>("game_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        budget: row.try_get("budget")?,
        spent_budget: row.try_get("spent_budget")?,
        roster_size: row.try_get("roster_size")?,
    })
}
