use crate::db::{BidQuery, Repository, RosterQuery};
use crate::domain::{BidStatus, GameId, UserId};
use crate::engine::{audit, ledger_digest, AuditInput, Divergence};
use crate::provider::{GameConfigProvider, ProviderError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Read-only reconciliation of bids, roster entries, and participant caches.
#[derive(Clone)]
pub struct Auditor {
    repo: Arc<Repository>,
    provider: Arc<dyn GameConfigProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub game_id: GameId,
    pub divergences: Vec<Divergence>,
    /// SHA-256 of the canonical ledger state at audit time.
    pub ledger_digest: String,
    pub bids: usize,
    pub active_roster_entries: usize,
    pub participants: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub game_id: GameId,
    pub dry_run: bool,
    /// Cache drift corrected (or, on a dry run, that would be corrected).
    pub repaired: Vec<Divergence>,
    /// Divergences that need an operator.
    pub manual: Vec<Divergence>,
}

impl Auditor {
    pub fn new(repo: Arc<Repository>, provider: Arc<dyn GameConfigProvider>) -> Self {
        Self { repo, provider }
    }

    /// Cross-check every view of the game's ledger. Never writes.
    pub async fn audit(&self, game_id: &GameId) -> Result<AuditReport, AuditError> {
        let max_riders = self.provider.game_config(game_id).await?.limits.max_riders;

        let bids = self.repo.query_bids(game_id, &BidQuery::default()).await?;
        let roster = self.repo.query_roster(game_id, &RosterQuery::default()).await?;
        let participants = self.repo.list_participants(game_id).await?;
        let won_bids: Vec<_> = bids
            .iter()
            .filter(|b| b.status == BidStatus::Won)
            .cloned()
            .collect();

        let divergences = audit(AuditInput {
            game_id,
            won_bids: &won_bids,
            roster: &roster,
            participants: &participants,
            max_riders,
        });
        for d in &divergences {
            warn!(
                game_id = %d.game_id,
                user_id = ?d.user_id,
                rider_id = ?d.rider_id,
                kind = d.kind.code(),
                "Ledger divergence"
            );
        }

        let report = AuditReport {
            game_id: game_id.clone(),
            ledger_digest: ledger_digest(&bids, &roster, &participants),
            bids: bids.len(),
            active_roster_entries: roster.iter().filter(|e| e.active).count(),
            participants: participants.len(),
            divergences,
        };
        info!(
            game_id = %game_id,
            divergences = report.divergences.len(),
            digest = %report.ledger_digest,
            "Audit complete"
        );
        Ok(report)
    }

    /// Correct participant cache drift by re-running the cache refresh.
    ///
    /// Every other divergence kind is returned untouched under `manual`.
    pub async fn repair(&self, game_id: &GameId, dry_run: bool) -> Result<RepairReport, AuditError> {
        let report = self.audit(game_id).await?;
        let (repaired, manual): (Vec<_>, Vec<_>) = report
            .divergences
            .into_iter()
            .partition(|d| d.kind.is_cache_drift());

        if !dry_run {
            let users: BTreeSet<&UserId> = repaired.iter().filter_map(|d| d.user_id.as_ref()).collect();
            for user in users {
                self.repo.refresh_participant(game_id, user).await?;
                info!(game_id = %game_id, user_id = %user, "Participant caches refreshed");
            }
        }

        Ok(RepairReport {
            game_id: game_id.clone(),
            dry_run,
            repaired,
            manual,
        })
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    game_id: &'a str,
    user_id: &'a str,
    rider_id: &'a str,
    kind: &'static str,
    detail: String,
}

/// Render divergences as CSV, one row per divergence.
pub fn divergences_to_csv(divergences: &[Divergence]) -> Result<String, AuditError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for d in divergences {
        writer.serialize(CsvRow {
            game_id: d.game_id.as_str(),
            user_id: d.user_id.as_ref().map(|u| u.as_str()).unwrap_or(""),
            rider_id: d.rider_id.as_ref().map(|r| r.as_str()).unwrap_or(""),
            kind: d.kind.code(),
            detail: serde_json::to_string(&d.kind).map_err(|e| AuditError::Export(e.to_string()))?,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AuditError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AuditError::Export(e.to_string()))
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to export audit: {0}")]
    Export(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{RiderId, TimeMs};
    use crate::engine::DivergenceKind;
    use crate::provider::MockGameConfigProvider;
    use tempfile::TempDir;

    async fn setup() -> (Auditor, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let provider =
            MockGameConfigProvider::new().with_game(GameId::new("g"), vec![], Vec::<RiderId>::new(), 32);
        (Auditor::new(repo.clone(), Arc::new(provider)), repo, temp_dir)
    }

    #[tokio::test]
    async fn test_clean_ledger_has_no_divergences() {
        let (auditor, repo, _temp) = setup().await;
        let game = GameId::new("g");
        let user = UserId::new("alice");
        repo.upsert_participant(&game, &user, 100).await.unwrap();
        repo.acquire_by_selection(&game, &user, &RiderId::new("r1"), 10, TimeMs::new(1))
            .await
            .unwrap();

        let report = auditor.audit(&game).await.unwrap();
        assert!(report.divergences.is_empty());
        assert_eq!(report.participants, 1);
        assert_eq!(report.active_roster_entries, 1);
        assert_eq!(report.ledger_digest.len(), 64);
    }

    #[tokio::test]
    async fn test_repair_fixes_drift_and_leaves_the_rest() {
        let (auditor, repo, _temp) = setup().await;
        let game = GameId::new("g");
        let user = UserId::new("alice");
        repo.upsert_participant(&game, &user, 100).await.unwrap();
        sqlx::query("UPDATE participants SET spent_budget = 40")
            .execute(repo.pool())
            .await
            .unwrap();
        // won bid with no roster entry
        sqlx::query(
            "INSERT INTO bids (id, game_id, period, user_id, rider_id, amount, placed_at_ms, status)
             VALUES ('b1', 'g', 'p1', 'alice', 'r1', 40, 1, 'won')",
        )
        .execute(repo.pool())
        .await
        .unwrap();

        let dry = auditor.repair(&game, true).await.unwrap();
        assert_eq!(dry.repaired.len(), 1);
        assert_eq!(dry.manual.len(), 1);
        assert!(matches!(dry.manual[0].kind, DivergenceKind::WonBidWithoutRoster { .. }));
        let p = repo.get_participant(&game, &user).await.unwrap().unwrap();
        assert_eq!(p.spent_budget, 40);

        let wet = auditor.repair(&game, false).await.unwrap();
        assert_eq!(wet.repaired.len(), 1);
        let p = repo.get_participant(&game, &user).await.unwrap().unwrap();
        assert_eq!(p.spent_budget, 0);

        let after = auditor.audit(&game).await.unwrap();
        assert_eq!(after.divergences.len(), 1);
    }

    #[tokio::test]
    async fn test_csv_export_has_header_and_rows() {
        let (auditor, repo, _temp) = setup().await;
        let game = GameId::new("g");
        repo.upsert_participant(&game, &UserId::new("alice"), 100).await.unwrap();
        sqlx::query("UPDATE participants SET roster_size = 3")
            .execute(repo.pool())
            .await
            .unwrap();

        let report = auditor.audit(&game).await.unwrap();
        let csv = divergences_to_csv(&report.divergences).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("game_id,user_id,rider_id,kind,detail"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("g,alice,,roster_size_drift,"));
        assert!(lines.next().is_none());
    }
}
