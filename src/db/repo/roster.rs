//! Roster entry operations for the repository.

use crate::domain::{AcquisitionType, GameId, RiderId, RosterEntry, TimeMs, UserId};
use sqlx::{QueryBuilder, Sqlite};

use super::{refresh_participant_totals, roster_entry_from_row, Repository};

/// Filters for listing roster entries.
#[derive(Debug, Clone, Default)]
pub struct RosterQuery {
    pub user_id: Option<UserId>,
    pub rider_id: Option<RiderId>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Repository {
    /// List a game's roster entries, ordered by user, rider, then id.
    pub async fn query_roster(
        &self,
        game_id: &GameId,
        query: &RosterQuery,
    ) -> Result<Vec<RosterEntry>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, game_id, user_id, rider_id, acquisition_type, price_paid, acquired_at_ms, active \
             FROM roster_entries WHERE game_id = ",
        );
        qb.push_bind(game_id.as_str());

        if let Some(user) = &query.user_id {
            qb.push(" AND user_id = ").push_bind(user.as_str());
        }
        if let Some(rider) = &query.rider_id {
            qb.push(" AND rider_id = ").push_bind(rider.as_str());
        }
        if let Some(active) = query.active {
            qb.push(" AND active = ").push_bind(active as i64);
        }

        qb.push(" ORDER BY user_id ASC, rider_id ASC, id ASC");
        qb.push(" LIMIT ").push_bind(query.limit.unwrap_or(-1));
        qb.push(" OFFSET ").push_bind(query.offset.unwrap_or(0));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(roster_entry_from_row).collect()
    }

    pub async fn active_roster_entries(&self, game_id: &GameId) -> Result<Vec<RosterEntry>, sqlx::Error> {
        self.query_roster(
            game_id,
            &RosterQuery {
                active: Some(true),
                ..RosterQuery::default()
            },
        )
        .await
    }

    /// Add a rider to a roster without a bid.
    ///
    /// Returns `None` when the user already holds an active entry for the rider.
    /// Caches are refreshed in the same transaction.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn acquire_by_selection(
        &self,
        game_id: &GameId,
        user_id: &UserId,
        rider_id: &RiderId,
        price_paid: i64,
        now: TimeMs,
    ) -> Result<Option<RosterEntry>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT OR IGNORE INTO roster_entries
                (game_id, user_id, rider_id, acquisition_type, price_paid, acquired_at_ms, active)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            RETURNING id, game_id, user_id, rider_id, acquisition_type, price_paid, acquired_at_ms, active
            "#,
        )
        .bind(game_id.as_str())
        .bind(user_id.as_str())
        .bind(rider_id.as_str())
        .bind(AcquisitionType::Selection.as_str())
        .bind(price_paid)
        .bind(now.as_ms())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let entry = roster_entry_from_row(&row)?;

        refresh_participant_totals(&mut tx, game_id, user_id).await?;
        tx.commit().await?;
        Ok(Some(entry))
    }

    /// Soft-remove a selection roster entry (`active = false`) and refresh its
    /// owner's caches.
    ///
    /// Returns false when the entry does not exist, is already inactive, or was
    /// won at auction. Auction entries are backed by a `won` bid and only
    /// finalization may remove them.
    pub async fn release_roster_entry(&self, game_id: &GameId, entry_id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE roster_entries SET active = 0
            WHERE id = ? AND game_id = ? AND active = 1 AND acquisition_type = 'selection'
            RETURNING user_id
            "#,
        )
        .bind(entry_id)
        .bind(game_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(owner) = owner else {
            tx.rollback().await?;
            return Ok(false);
        };

        refresh_participant_totals(&mut tx, game_id, &UserId::new(owner)).await?;
        tx.commit().await?;
        Ok(true)
    }
}
