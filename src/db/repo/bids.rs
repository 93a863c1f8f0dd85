//! Bid operations for the repository.

use crate::domain::{Bid, BidId, BidStatus, GameId, RiderId, TimeMs, UserId};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::{bid_from_row, Repository};

/// Rider state an intake decision is made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiderSnapshot {
    /// Current value of the rider's version counter (0 when never bid on).
    pub version: i64,
    /// The rider's `active` bids in the period being bid into.
    pub active_bids: Vec<Bid>,
    /// Whether the bidding user already holds an active roster entry for the rider.
    pub user_holds_entry: bool,
    /// Owner of the rider's active auction roster entry, if any.
    pub auction_holder: Option<UserId>,
}

/// Result of a conditional bid commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidCommit {
    Committed,
    /// The rider's version moved since the snapshot was read.
    Conflict,
    /// The period stopped accepting bids between the read and the write.
    PeriodClosed,
}

/// Filters for listing bids.
#[derive(Debug, Clone, Default)]
pub struct BidQuery {
    pub status: Option<BidStatus>,
    pub rider_id: Option<RiderId>,
    pub user_id: Option<UserId>,
    pub period: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Repository {
    /// Read everything intake needs to place a bid on one rider in `period`.
    ///
    /// Only the period's own bids are loaded; bids of other periods never
    /// compete with it.
    pub async fn rider_snapshot(
        &self,
        game_id: &GameId,
        period: &str,
        rider_id: &RiderId,
        user_id: &UserId,
    ) -> Result<RiderSnapshot, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;

        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM rider_versions WHERE game_id = ? AND rider_id = ?",
        )
        .bind(game_id.as_str())
        .bind(rider_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, game_id, period, user_id, rider_id, amount, placed_at_ms, status
            FROM bids
            WHERE game_id = ? AND period = ? AND rider_id = ? AND status = 'active'
            ORDER BY placed_at_ms ASC, id ASC
            "#,
        )
        .bind(game_id.as_str())
        .bind(period)
        .bind(rider_id.as_str())
        .fetch_all(&mut *conn)
        .await?;
        let active_bids = rows.iter().map(bid_from_row).collect::<Result<Vec<_>, _>>()?;

        let user_holds_entry: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM roster_entries
                WHERE game_id = ? AND user_id = ? AND rider_id = ? AND active = 1
            )
            "#,
        )
        .bind(game_id.as_str())
        .bind(user_id.as_str())
        .bind(rider_id.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let auction_holder: Option<String> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM roster_entries
            WHERE game_id = ? AND rider_id = ? AND active = 1 AND acquisition_type = 'auction'
            "#,
        )
        .bind(game_id.as_str())
        .bind(rider_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(RiderSnapshot {
            version: version.unwrap_or(0),
            active_bids,
            user_holds_entry,
            auction_holder: auction_holder.map(UserId::new),
        })
    }

    /// Insert `bid` and move `outbid` to `outbid`, conditional on the rider's
    /// version still being `expected_version`. Only bids of `bid.period` are
    /// ever outbid.
    ///
    /// The version bump is the transaction's first statement, so the write
    /// lock is taken before anything is read and concurrent commits on the
    /// same rider serialize on it.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn commit_bid(
        &self,
        expected_version: i64,
        bid: &Bid,
        outbid: &[BidId],
    ) -> Result<BidCommit, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let cas = sqlx::query(
            r#"
            INSERT INTO rider_versions (game_id, rider_id, version) VALUES (?, ?, 1)
            ON CONFLICT(game_id, rider_id) DO UPDATE SET version = version + 1
            WHERE rider_versions.version = ?
            "#,
        )
        .bind(bid.game_id.as_str())
        .bind(bid.rider_id.as_str())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if cas.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(game_id = %bid.game_id, rider_id = %bid.rider_id, expected_version, "Rider version moved");
            return Ok(BidCommit::Conflict);
        }

        let period_status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM auction_periods WHERE game_id = ? AND name = ?",
        )
        .bind(bid.game_id.as_str())
        .bind(bid.period.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if period_status.as_deref() != Some("active") {
            tx.rollback().await?;
            return Ok(BidCommit::PeriodClosed);
        }

        sqlx::query(
            r#"
            INSERT INTO bids (id, game_id, period, user_id, rider_id, amount, placed_at_ms, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(bid.id.as_str())
        .bind(bid.game_id.as_str())
        .bind(bid.period.as_str())
        .bind(bid.user_id.as_str())
        .bind(bid.rider_id.as_str())
        .bind(bid.amount)
        .bind(bid.placed_at.as_ms())
        .bind(bid.status.as_str())
        .execute(&mut *tx)
        .await?;

        for id in outbid {
            sqlx::query(
                "UPDATE bids SET status = 'outbid' WHERE id = ? AND game_id = ? AND period = ? AND status = 'active'",
            )
            .bind(id.as_str())
            .bind(bid.game_id.as_str())
            .bind(bid.period.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(BidCommit::Committed)
    }

    pub async fn get_bid(&self, id: &BidId) -> Result<Option<Bid>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, game_id, period, user_id, rider_id, amount, placed_at_ms, status
            FROM bids
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(bid_from_row).transpose()
    }

    /// List a game's bids with optional filters, ordered by placement time then id.
    pub async fn query_bids(&self, game_id: &GameId, query: &BidQuery) -> Result<Vec<Bid>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, game_id, period, user_id, rider_id, amount, placed_at_ms, status \
             FROM bids WHERE game_id = ",
        );
        qb.push_bind(game_id.as_str());

        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(rider) = &query.rider_id {
            qb.push(" AND rider_id = ").push_bind(rider.as_str());
        }
        if let Some(user) = &query.user_id {
            qb.push(" AND user_id = ").push_bind(user.as_str());
        }
        if let Some(period) = &query.period {
            qb.push(" AND period = ").push_bind(period.as_str());
        }

        qb.push(" ORDER BY placed_at_ms ASC, id ASC");
        // SQLite requires LIMIT before OFFSET; -1 means unbounded.
        qb.push(" LIMIT ").push_bind(query.limit.unwrap_or(-1));
        qb.push(" OFFSET ").push_bind(query.offset.unwrap_or(0));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(bid_from_row).collect()
    }

    /// Bids placed inside `[start, end]` whose status is one of `statuses`.
    pub async fn bids_in_window(
        &self,
        game_id: &GameId,
        start: TimeMs,
        end: TimeMs,
        statuses: &[BidStatus],
    ) -> Result<Vec<Bid>, sqlx::Error> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, game_id, period, user_id, rider_id, amount, placed_at_ms, status \
             FROM bids WHERE game_id = ",
        );
        qb.push_bind(game_id.as_str());
        qb.push(" AND placed_at_ms >= ").push_bind(start.as_ms());
        qb.push(" AND placed_at_ms <= ").push_bind(end.as_ms());
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
        qb.push(" ORDER BY placed_at_ms ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(bid_from_row).collect()
    }

    /// Put up to `limit` resettable bids inside `[start, end]` back to `active`.
    ///
    /// Returns the number of bids reset; callers loop until it returns 0.
    pub async fn reset_bids_in_window_chunk(
        &self,
        game_id: &GameId,
        start: TimeMs,
        end: TimeMs,
        limit: usize,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids SET status = 'active'
            WHERE id IN (
                SELECT id FROM bids
                WHERE game_id = ? AND placed_at_ms >= ? AND placed_at_ms <= ?
                  AND status IN (
                      'won', 'cancelled_team_full', 'cancelled_over_budget',
                      'cancelled_duplicate', 'cancelled_overflow'
                  )
                ORDER BY id ASC
                LIMIT ?
            )
            "#,
        )
        .bind(game_id.as_str())
        .bind(start.as_ms())
        .bind(end.as_ms())
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Number of bids per status for one game.
    pub async fn bid_status_counts(&self, game_id: &GameId) -> Result<Vec<(BidStatus, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM bids WHERE game_id = ? GROUP BY status ORDER BY status",
        )
        .bind(game_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(BidStatus, i64), sqlx::Error> {
                let status: String = row.try_get("status")?;
                let status = status.parse::<BidStatus>().map_err(|e| sqlx::Error::ColumnDecode {
                    index: "status".to_string(),
                    source: e.into(),
                })?;
                Ok((status, row.try_get("n")?))
            })
            .collect()
    }
}
