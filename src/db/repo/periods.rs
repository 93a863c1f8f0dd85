//! Auction period operations for the repository.

use crate::domain::{AuctionPeriod, GameId, PeriodStatus, TimeMs};

use super::{period_from_row, Repository};

impl Repository {
    /// Insert a period definition, or refresh the dates of an existing one.
    ///
    /// The stored status is owned by the ledger and is never overwritten here.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_period_definition(&self, period: &AuctionPeriod) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO auction_periods (game_id, name, start_ms, end_ms, finalize_ms, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_id, name) DO UPDATE SET
                start_ms = excluded.start_ms,
                end_ms = excluded.end_ms,
                finalize_ms = excluded.finalize_ms
            WHERE auction_periods.start_ms != excluded.start_ms
               OR auction_periods.end_ms != excluded.end_ms
               OR auction_periods.finalize_ms != excluded.finalize_ms
            "#,
        )
        .bind(period.game_id.as_str())
        .bind(period.name.as_str())
        .bind(period.start.as_ms())
        .bind(period.end.as_ms())
        .bind(period.finalize_at.as_ms())
        .bind(PeriodStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_period(&self, game_id: &GameId, name: &str) -> Result<Option<AuctionPeriod>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT game_id, name, start_ms, end_ms, finalize_ms, status
            FROM auction_periods
            WHERE game_id = ? AND name = ?
            "#,
        )
        .bind(game_id.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(period_from_row).transpose()
    }

    /// All periods of a game, ordered by start then name.
    pub async fn list_periods(&self, game_id: &GameId) -> Result<Vec<AuctionPeriod>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT game_id, name, start_ms, end_ms, finalize_ms, status
            FROM auction_periods
            WHERE game_id = ?
            ORDER BY start_ms ASC, name ASC
            "#,
        )
        .bind(game_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(period_from_row).collect()
    }

    /// The period whose inclusive window contains `t`.
    ///
    /// Windows are not expected to overlap; if they do, the earliest start wins.
    pub async fn period_at(&self, game_id: &GameId, t: TimeMs) -> Result<Option<AuctionPeriod>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT game_id, name, start_ms, end_ms, finalize_ms, status
            FROM auction_periods
            WHERE game_id = ? AND start_ms <= ? AND end_ms >= ?
            ORDER BY start_ms ASC, name ASC
            LIMIT 1
            "#,
        )
        .bind(game_id.as_str())
        .bind(t.as_ms())
        .bind(t.as_ms())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(period_from_row).transpose()
    }

    /// Move a period from `from` to `to` only if it is still in `from`.
    ///
    /// Returns false when another writer changed the status first.
    pub async fn compare_and_set_period_status(
        &self,
        game_id: &GameId,
        name: &str,
        from: PeriodStatus,
        to: PeriodStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auction_periods SET status = ? WHERE game_id = ? AND name = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(game_id.as_str())
        .bind(name)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
