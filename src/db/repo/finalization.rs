//! Chunked finalization commits.
//!
//! Each chunk is one transaction. Its first statement bumps the run row, so
//! the write lock is held before any settlement state is read, and every
//! decision is taken against state no other writer can change until commit.

use crate::domain::{
    AcquisitionType, AuctionPeriod, Bid, BidId, BidStatus, RiderId, TimeMs, UserId,
};
use crate::engine::{decide_settlement, FinalizeOp, SettleContext, SettleOutcome, StatusChange};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info};

use super::{bid_from_row, derived_totals, refresh_participant_totals, Repository};

/// How one rider's winner settled in a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub rider_id: RiderId,
    pub user_id: UserId,
    pub bid_id: BidId,
    pub amount: i64,
    pub outcome: SettleOutcome,
}

/// Everything a committed chunk changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkResult {
    /// Bid status changes that were actually written.
    pub transitions: Vec<StatusChange>,
    pub settlements: Vec<Settlement>,
}

impl Repository {
    /// Apply one chunk of finalization ops atomically.
    ///
    /// Every op re-reads the rows it touches and writes conditionally, so a
    /// chunk replayed after a crash, or racing another run of the same period,
    /// only writes what is still missing.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing from the chunk is kept.
    pub async fn apply_finalize_chunk(
        &self,
        period: &AuctionPeriod,
        ops: &[FinalizeOp],
        max_riders: i64,
        now: TimeMs,
    ) -> Result<ChunkResult, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO finalization_runs (game_id, period, chunks_committed, last_chunk_at_ms)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(game_id, period) DO UPDATE SET
                chunks_committed = chunks_committed + 1,
                last_chunk_at_ms = excluded.last_chunk_at_ms
            "#,
        )
        .bind(period.game_id.as_str())
        .bind(period.name.as_str())
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        let mut result = ChunkResult::default();
        for op in ops {
            match op {
                FinalizeOp::MarkLost(bid) => {
                    if mark_lost(&mut tx, bid).await? {
                        result.transitions.push(StatusChange {
                            bid_id: bid.id.clone(),
                            user_id: bid.user_id.clone(),
                            rider_id: bid.rider_id.clone(),
                            amount: bid.amount,
                            from: bid.status,
                            to: BidStatus::Lost,
                        });
                    }
                }
                FinalizeOp::Settle { winner, contenders, .. } => {
                    settle(&mut tx, period, winner, contenders, max_riders, now, &mut result).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(result)
    }

    /// Number of chunks committed so far for a period, across all runs.
    pub async fn finalization_chunks_committed(
        &self,
        period: &AuctionPeriod,
    ) -> Result<i64, sqlx::Error> {
        let committed: Option<i64> = sqlx::query_scalar(
            "SELECT chunks_committed FROM finalization_runs WHERE game_id = ? AND period = ?",
        )
        .bind(period.game_id.as_str())
        .bind(period.name.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(committed.unwrap_or(0))
    }
}

/// `active`|`outbid` -> `lost`, unless the bid's owner holds the rider's auction entry.
async fn mark_lost(conn: &mut SqliteConnection, bid: &Bid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE bids SET status = 'lost'
        WHERE id = ? AND status = ?
          AND NOT EXISTS (
              SELECT 1 FROM roster_entries r
              WHERE r.game_id = bids.game_id AND r.rider_id = bids.rider_id
                AND r.user_id = bids.user_id AND r.active = 1
                AND r.acquisition_type = 'auction'
          )
        "#,
    )
    .bind(bid.id.as_str())
    .bind(bid.status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn current_bids(conn: &mut SqliteConnection, ids: &[&BidId]) -> Result<Vec<Bid>, sqlx::Error> {
    let mut bids = Vec::with_capacity(ids.len());
    for id in ids {
        let row = sqlx::query(
            r#"
            SELECT id, game_id, period, user_id, rider_id, amount, placed_at_ms, status
            FROM bids WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = row {
            bids.push(bid_from_row(&row)?);
        }
    }
    Ok(bids)
}

async fn settlement_context(
    conn: &mut SqliteConnection,
    period: &AuctionPeriod,
    winner: &Bid,
    max_riders: i64,
) -> Result<SettleContext, sqlx::Error> {
    let game_id = &winner.game_id;

    let holder: Option<String> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM roster_entries
        WHERE game_id = ? AND rider_id = ? AND active = 1 AND acquisition_type = 'auction'
        "#,
    )
    .bind(game_id.as_str())
    .bind(winner.rider_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let holder = holder.map(UserId::new);

    let holder_bids = match &holder {
        Some(holder) if *holder != winner.user_id => {
            let rows = sqlx::query(
                r#"
                SELECT id, game_id, period, user_id, rider_id, amount, placed_at_ms, status
                FROM bids
                WHERE game_id = ? AND rider_id = ? AND user_id = ?
                  AND placed_at_ms >= ? AND placed_at_ms <= ?
                  AND status IN ('active', 'won')
                "#,
            )
            .bind(game_id.as_str())
            .bind(winner.rider_id.as_str())
            .bind(holder.as_str())
            .bind(period.start.as_ms())
            .bind(period.end.as_ms())
            .fetch_all(&mut *conn)
            .await?;
            rows.iter().map(bid_from_row).collect::<Result<Vec<_>, _>>()?
        }
        _ => Vec::new(),
    };

    let winner_has_entry: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM roster_entries
            WHERE game_id = ? AND user_id = ? AND rider_id = ? AND active = 1
        )
        "#,
    )
    .bind(game_id.as_str())
    .bind(winner.user_id.as_str())
    .bind(winner.rider_id.as_str())
    .fetch_one(&mut *conn)
    .await?;

    let budget: Option<i64> =
        sqlx::query_scalar("SELECT budget FROM participants WHERE game_id = ? AND user_id = ?")
            .bind(game_id.as_str())
            .bind(winner.user_id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    let totals = derived_totals(conn, game_id, &winner.user_id).await?;

    Ok(SettleContext {
        holder,
        holder_bids,
        winner_has_entry,
        budget,
        totals,
        max_riders,
    })
}

async fn settle(
    conn: &mut SqliteConnection,
    period: &AuctionPeriod,
    planned_winner: &Bid,
    planned_contenders: &[Bid],
    max_riders: i64,
    now: TimeMs,
    result: &mut ChunkResult,
) -> Result<(), sqlx::Error> {
    // The plan may be stale if another run got here first.
    let Some(winner) = current_bids(conn, &[&planned_winner.id]).await?.pop() else {
        return Ok(());
    };
    if !matches!(winner.status, BidStatus::Active | BidStatus::Won) {
        debug!(bid_id = %winner.id, status = %winner.status, "Winner already resolved, skipping");
        return Ok(());
    }
    let contender_ids: Vec<&BidId> = planned_contenders.iter().map(|b| &b.id).collect();
    let contenders: Vec<Bid> = current_bids(conn, &contender_ids)
        .await?
        .into_iter()
        .filter(|b| b.status == BidStatus::Won)
        .collect();

    let ctx = settlement_context(conn, period, &winner, max_riders).await?;
    let decision = decide_settlement(&winner, &contenders, &ctx);

    for change in decision.changes {
        let applied = sqlx::query("UPDATE bids SET status = ? WHERE id = ? AND status = ?")
            .bind(change.to.as_str())
            .bind(change.bid_id.as_str())
            .bind(change.from.as_str())
            .execute(&mut *conn)
            .await?;
        if applied.rows_affected() > 0 {
            result.transitions.push(change);
        }
    }

    if decision.award {
        sqlx::query(
            r#"
            INSERT INTO roster_entries
                (game_id, user_id, rider_id, acquisition_type, price_paid, acquired_at_ms, active)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(winner.game_id.as_str())
        .bind(winner.user_id.as_str())
        .bind(winner.rider_id.as_str())
        .bind(AcquisitionType::Auction.as_str())
        .bind(winner.amount)
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;
    }

    if decision.release {
        sqlx::query(
            r#"
            UPDATE roster_entries SET active = 0
            WHERE game_id = ? AND user_id = ? AND rider_id = ?
              AND active = 1 AND acquisition_type = 'auction'
            "#,
        )
        .bind(winner.game_id.as_str())
        .bind(winner.user_id.as_str())
        .bind(winner.rider_id.as_str())
        .execute(&mut *conn)
        .await?;
    }

    if decision.award || decision.release {
        refresh_participant_totals(conn, &winner.game_id, &winner.user_id).await?;
    }

    match decision.outcome {
        SettleOutcome::Awarded | SettleOutcome::AlreadyApplied => {
            debug!(rider_id = %winner.rider_id, user_id = %winner.user_id, outcome = ?decision.outcome, "Settled");
        }
        outcome => {
            info!(
                game_id = %winner.game_id,
                period = %period.name,
                rider_id = %winner.rider_id,
                user_id = %winner.user_id,
                bid_id = %winner.id,
                amount = winner.amount,
                outcome = ?outcome,
                "Winning bid not applied"
            );
        }
    }

    result.settlements.push(Settlement {
        rider_id: winner.rider_id.clone(),
        user_id: winner.user_id.clone(),
        bid_id: winner.id.clone(),
        amount: winner.amount,
        outcome: decision.outcome,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup_test_db;
    use super::*;
    use crate::domain::GameId;
    use crate::engine::{chunk_ops, plan_finalization};

    async fn insert_bid(repo: &Repository, id: &str, user: &str, rider: &str, amount: i64, at: i64, status: &str) {
        sqlx::query(
            "INSERT INTO bids (id, game_id, period, user_id, rider_id, amount, placed_at_ms, status)
             VALUES (?, 'g', 'p1', ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user)
        .bind(rider)
        .bind(amount)
        .bind(at)
        .bind(status)
        .execute(repo.pool())
        .await
        .unwrap();
    }

    fn period() -> AuctionPeriod {
        AuctionPeriod::new(
            GameId::new("g"),
            "p1",
            TimeMs::new(0),
            TimeMs::new(1000),
            TimeMs::new(1000),
        )
        .unwrap()
    }

    async fn run(repo: &Repository) -> ChunkResult {
        let p = period();
        let bids = repo
            .bids_in_window(
                &p.game_id,
                p.start,
                p.end,
                &[BidStatus::Active, BidStatus::Won, BidStatus::Outbid],
            )
            .await
            .unwrap();
        let mut total = ChunkResult::default();
        for chunk in chunk_ops(plan_finalization(bids), 500) {
            let r = repo.apply_finalize_chunk(&p, &chunk, 32, TimeMs::new(2000)).await.unwrap();
            total.transitions.extend(r.transitions);
            total.settlements.extend(r.settlements);
        }
        total
    }

    #[tokio::test]
    async fn test_chunk_awards_winner_and_marks_loser() {
        let (repo, _temp) = setup_test_db().await;
        let game = GameId::new("g");
        repo.upsert_participant(&game, &UserId::new("alice"), 1000).await.unwrap();
        repo.upsert_participant(&game, &UserId::new("bob"), 1000).await.unwrap();
        insert_bid(&repo, "a", "alice", "r1", 100, 10, "outbid").await;
        insert_bid(&repo, "b", "bob", "r1", 150, 20, "active").await;

        let result = run(&repo).await;
        assert_eq!(result.settlements.len(), 1);
        assert!(result
            .transitions
            .iter()
            .any(|t| t.bid_id == BidId::new("a") && t.from == BidStatus::Outbid && t.to == BidStatus::Lost));
        assert_eq!(result.settlements[0].outcome, SettleOutcome::Awarded);

        assert_eq!(repo.get_bid(&BidId::new("a")).await.unwrap().unwrap().status, BidStatus::Lost);
        assert_eq!(repo.get_bid(&BidId::new("b")).await.unwrap().unwrap().status, BidStatus::Won);
        let bob = repo.get_participant(&game, &UserId::new("bob")).await.unwrap().unwrap();
        assert_eq!((bob.spent_budget, bob.roster_size), (150, 1));
        assert_eq!(repo.finalization_chunks_committed(&period()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rerun_writes_nothing() {
        let (repo, _temp) = setup_test_db().await;
        let game = GameId::new("g");
        repo.upsert_participant(&game, &UserId::new("bob"), 1000).await.unwrap();
        insert_bid(&repo, "b", "bob", "r1", 150, 20, "active").await;

        run(&repo).await;
        let again = run(&repo).await;
        assert!(again.transitions.is_empty());
        assert_eq!(again.settlements[0].outcome, SettleOutcome::AlreadyApplied);
        assert_eq!(repo.active_roster_entries(&game).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_holder_bid_is_never_marked_lost() {
        let (repo, _temp) = setup_test_db().await;
        let game = GameId::new("g");
        repo.upsert_participant(&game, &UserId::new("carol"), 1000).await.unwrap();
        repo.upsert_participant(&game, &UserId::new("bob"), 1000).await.unwrap();
        // carol holds r1 from an earlier partial run; her bid was reset to active.
        sqlx::query(
            "INSERT INTO roster_entries (game_id, user_id, rider_id, acquisition_type, price_paid, acquired_at_ms, active)
             VALUES ('g', 'carol', 'r1', 'auction', 120, 5, 1)",
        )
        .execute(repo.pool())
        .await
        .unwrap();
        insert_bid(&repo, "c", "carol", "r1", 120, 10, "active").await;
        insert_bid(&repo, "b", "bob", "r1", 150, 20, "won").await;

        let result = run(&repo).await;
        assert_eq!(result.settlements[0].outcome, SettleOutcome::Duplicate);
        assert_eq!(repo.get_bid(&BidId::new("c")).await.unwrap().unwrap().status, BidStatus::Won);
        assert_eq!(
            repo.get_bid(&BidId::new("b")).await.unwrap().unwrap().status,
            BidStatus::CancelledDuplicate
        );
        let roster = repo.active_roster_entries(&game).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, UserId::new("carol"));
    }
}
