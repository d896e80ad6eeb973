use std::collections::HashSet;

use crate::backup::{BackupStrategy, DiaryBackup};
use crate::config::{CloudConfig, Config, ConfigStore};
use crate::error::AppResult;
use crate::local::LocalStore;
use crate::models::diary::DiaryEntry;
use crate::models::diet::DietPlan;
use crate::models::evidence::EvidenceEntry;
use crate::remote::{ConnectionStatus, RemoteStore};

/// Local-storage key holding the tombstone set of deleted evidence photo URLs.
pub const DELETED_EVIDENCE_URLS_KEY: &str = "deleted_evidence_urls";

/// The single entry point consumers use for entity-level operations.
///
/// Wraps the remote store with disabled-cloud short-circuiting: with the
/// cloud off, every fetch is `None` and every write reports local-only
/// success, so the app keeps working as a purely local tool.
///
/// Write contract: callers apply changes to their state *before* awaiting
/// the remote call and roll back on a `false` result (see
/// [`OptimisticUpdate`]). The service does not buffer or retry — recovery
/// policy lives with the caller.
#[derive(Debug)]
pub struct SyncService {
    config: ConfigStore,
    remote: RemoteStore,
    backup: DiaryBackup,
    local: LocalStore,
}

impl SyncService {
    pub fn new(master: Config, local: LocalStore) -> Self {
        Self::with_backup_strategy(master, local, BackupStrategy::default())
    }

    pub fn with_backup_strategy(
        master: Config,
        local: LocalStore,
        strategy: BackupStrategy,
    ) -> Self {
        let config = ConfigStore::load(master, local.clone());
        let remote = RemoteStore::new(config.current().clone());
        Self {
            config,
            remote,
            backup: DiaryBackup::new(strategy),
            local,
        }
    }

    pub fn cloud_config(&self) -> &CloudConfig {
        self.config.current()
    }

    pub fn is_cloud_enabled(&self) -> bool {
        self.config.current().is_active()
    }

    pub fn save_config(&mut self, config: CloudConfig) -> AppResult<()> {
        self.config.save(config)?;
        self.remote = RemoteStore::new(self.config.current().clone());
        Ok(())
    }

    /// Wipes all local state and rebuilds from the master credentials. The
    /// caller must re-fetch everything afterwards.
    pub fn reset_to_master(&mut self) -> AppResult<()> {
        self.config.reset_to_master()?;
        self.remote = RemoteStore::new(self.config.current().clone());
        Ok(())
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        self.remote.test_connection().await
    }

    pub async fn fetch_diary(&self) -> Option<Vec<DiaryEntry>> {
        self.remote.fetch_diary().await
    }

    pub async fn fetch_diet(&self) -> Option<DietPlan> {
        self.remote.fetch_diet().await
    }

    /// Fetches evidence entries with tombstoned photo URLs masked out, so an
    /// entry whose remote delete silently failed can never resurface.
    pub async fn fetch_evidences(&self) -> Option<Vec<EvidenceEntry>> {
        let entries = self.remote.fetch_evidences().await?;
        let tombstones = self.tombstones();
        Some(
            entries
                .into_iter()
                .filter(|e| !tombstones.contains(&e.photo_url))
                .collect(),
        )
    }

    /// Syncs the whole diary list and refreshes the redundant backup copy.
    pub async fn save_diary_list(&self, entries: &[DiaryEntry]) -> bool {
        if !self.is_cloud_enabled() {
            return true;
        }
        let synced = self.remote.sync_diary(entries).await;
        // The backup is best-effort insurance; it must not fail the save.
        if !self.backup.save(&self.remote, entries).await {
            tracing::warn!("Diary backup refresh failed");
        }
        synced
    }

    pub async fn delete_diary_entry(&self, id: &str) -> bool {
        if !self.is_cloud_enabled() {
            return true;
        }
        self.remote.delete_diary(id).await
    }

    /// Recovers the diary list from the redundant backup copy, for when the
    /// main table's schema has drifted under the normal fetch path.
    pub async fn recover_diary_backup(&self) -> Option<Vec<DiaryEntry>> {
        if !self.is_cloud_enabled() {
            return None;
        }
        self.backup.fetch(&self.remote).await
    }

    pub async fn save_diet_plan(&self, plan: &DietPlan) -> bool {
        if !self.is_cloud_enabled() {
            return true;
        }
        self.remote.sync_diet(plan).await
    }

    pub async fn upload_photo(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Option<String> {
        self.remote.upload_photo(file_name, mime, bytes).await
    }

    /// Records a new evidence entry. A tombstone matching its photo URL is
    /// cleared first: resurrection via re-upload is legitimate.
    pub async fn add_evidence(&self, entry: &EvidenceEntry) -> Option<EvidenceEntry> {
        let mut tombstones = self.tombstones();
        if tombstones.remove(&entry.photo_url) {
            self.save_tombstones(&tombstones);
        }
        if !self.is_cloud_enabled() {
            return None;
        }
        self.remote.create_evidence(entry).await
    }

    /// Deletes an evidence entry. The photo URL is tombstoned up front, so
    /// even when the remote protocol cannot confirm the delete the entry
    /// stays hidden locally.
    pub async fn delete_evidence(&self, entry: &EvidenceEntry) -> bool {
        let mut tombstones = self.tombstones();
        if tombstones.insert(entry.photo_url.clone()) {
            self.save_tombstones(&tombstones);
        }
        if !self.is_cloud_enabled() {
            return true;
        }
        let deleted = self.remote.delete_evidence(entry).await;
        if !deleted {
            tracing::warn!(
                photo_url = %entry.photo_url,
                "Remote delete unconfirmed; entry stays hidden locally"
            );
        }
        deleted
    }

    fn tombstones(&self) -> HashSet<String> {
        self.local
            .get::<Vec<String>>(DELETED_EVIDENCE_URLS_KEY)
            .map(|urls| urls.into_iter().collect())
            .unwrap_or_default()
    }

    fn save_tombstones(&self, tombstones: &HashSet<String>) {
        let urls: Vec<&String> = tombstones.iter().collect();
        if let Err(e) = self.local.set(DELETED_EVIDENCE_URLS_KEY, &urls) {
            tracing::error!(error = %e, "Failed to persist evidence tombstones");
        }
    }
}

/// Formalizes the optimistic-update contract: snapshot the state being
/// changed, apply the change, await the remote call, then either `commit`
/// or take the snapshot back via `rollback`.
#[must_use = "an optimistic update must be committed or rolled back"]
#[derive(Debug)]
pub struct OptimisticUpdate<T> {
    snapshot: T,
}

impl<T> OptimisticUpdate<T> {
    pub fn begin(snapshot: T) -> Self {
        Self { snapshot }
    }

    /// The remote write succeeded; the snapshot is no longer needed.
    pub fn commit(self) {}

    /// The remote write failed; hand the pre-change state back to the caller.
    pub fn rollback(self) -> T {
        self.snapshot
    }
}

/// Applies an asynchronously produced insight to the entry it was generated
/// for. Returns `false` when the entry no longer exists — an enrichment
/// racing a delete is simply dropped.
pub fn apply_insight(entries: &mut [DiaryEntry], id: &str, insight: String) -> bool {
    match entries.iter_mut().find(|e| e.id == id) {
        Some(entry) => {
            entry.insight = Some(insight);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn master_for(url: &str) -> Config {
        Config {
            supabase_url: url.to_string(),
            supabase_key: "test-key".into(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-3-flash-preview".into(),
        }
    }

    fn temp_local() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::at(dir.path().to_path_buf()).unwrap();
        (dir, local)
    }

    fn evidence(id: &str, url: &str) -> EvidenceEntry {
        EvidenceEntry {
            id: id.into(),
            task_name: "Ordenar el estudio".into(),
            photo_url: url.into(),
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn tombstoned_urls_are_masked_until_readded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/evidences"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "1", "task_name": "a", "photo_url": "u1", "created_at": "2024-01-01T00:00:00Z" },
                { "id": "2", "task_name": "b", "photo_url": "u2", "created_at": "2024-01-02T00:00:00Z" }
            ])))
            .mount(&server)
            .await;
        // The remote keeps returning u1 (its delete was silently filtered),
        // and the delete protocol keeps seeing the row.
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/evidences"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/evidences"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "9", "task_name": "a", "photo_url": "u1", "created_at": "2024-01-03T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let (_dir, local) = temp_local();
        let service = SyncService::new(master_for(&server.uri()), local);

        assert!(!service.delete_evidence(&evidence("1", "u1")).await);

        let visible = service.fetch_evidences().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].photo_url, "u2");

        // Re-adding the same URL clears its tombstone.
        service.add_evidence(&evidence("9", "u1")).await;
        let visible = service.fetch_evidences().await.unwrap();
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn disabled_cloud_short_circuits_every_operation() {
        let (_dir, local) = temp_local();
        let service = SyncService::new(master_for(""), local);

        assert!(!service.is_cloud_enabled());
        assert!(service.fetch_diary().await.is_none());
        assert!(service.fetch_diet().await.is_none());
        assert!(service.fetch_evidences().await.is_none());
        // Writes report local-only success rather than failing the UI.
        assert!(service.save_diary_list(&[]).await);
        assert!(service.delete_diary_entry("x").await);
        assert!(
            service
                .save_diet_plan(&DietPlan {
                    name: "p".into(),
                    schedule: vec![],
                    recommendations: vec![],
                })
                .await
        );
        assert!(service.delete_evidence(&evidence("1", "u1")).await);
        assert!(service.recover_diary_backup().await.is_none());
    }

    #[tokio::test]
    async fn save_diary_list_refreshes_the_backup() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/diary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "e1" }])))
            .mount(&server)
            .await;
        // Sentinel refresh: prior sentinel rows deleted, fresh one inserted.
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/evidences"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/evidences"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "s", "task_name": crate::backup::DIARY_BACKUP_TASK,
                  "photo_url": "[]", "created_at": "2024-01-01T00:00:00Z" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, local) = temp_local();
        let service = SyncService::with_backup_strategy(
            master_for(&server.uri()),
            local,
            BackupStrategy::SentinelRow,
        );

        let mut entry = DiaryEntry::new("2024-01-01", "s", "e", "t");
        entry.id = "e1".into();
        assert!(service.save_diary_list(&[entry]).await);
    }

    #[tokio::test]
    async fn reset_to_master_drops_tombstones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/evidences"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "1", "task_name": "a", "photo_url": "u1", "created_at": "2024-01-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (_dir, local) = temp_local();
        let mut service = SyncService::new(master_for(&server.uri()), local);

        service.delete_evidence(&evidence("1", "u1")).await;
        assert!(service.fetch_evidences().await.unwrap().is_empty());

        service.reset_to_master().unwrap();
        // The canonical source wins again: the entry is visible once more.
        assert_eq!(service.fetch_evidences().await.unwrap().len(), 1);
    }

    #[test]
    fn optimistic_update_rollback_returns_the_snapshot() {
        let before = vec!["a".to_string()];
        let mut state = before.clone();

        let tx = OptimisticUpdate::begin(state.clone());
        state.push("b".into());
        // Remote write failed: restore.
        state = tx.rollback();
        assert_eq!(state, before);

        let tx = OptimisticUpdate::begin(state.clone());
        state.push("b".into());
        tx.commit();
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn stale_insight_is_dropped_when_the_entry_is_gone() {
        let mut entries = vec![DiaryEntry::new("2024-01-01", "s", "e", "t")];
        let id = entries[0].id.clone();

        assert!(apply_insight(&mut entries, &id, "una lectura amable".into()));
        assert_eq!(entries[0].insight.as_deref(), Some("una lectura amable"));

        entries.clear();
        assert!(!apply_insight(&mut entries, &id, "late".into()));
    }
}
