use serde_json::Value;

use crate::models::diary::{self, DiaryEntry};
use crate::models::evidence::EvidenceEntry;
use crate::remote::{RemoteStore, Table};

/// Reserved task name marking an evidences row as a diary backup carrier.
/// Rows tagged with it never surface as real evidence.
pub const DIARY_BACKUP_TASK: &str = "__diary_backup_v1__";

/// Fixed object path for the blob-backed backup document.
pub const DIARY_BACKUP_OBJECT: &str = "diary-backup-v1.json";

/// Where the redundant diary copy lives.
///
/// Both strategies encode the full diary list as one JSON document; they only
/// differ in the carrier. The blob strategy overwrites a well-known object in
/// photo storage. The sentinel strategy smuggles the document through the
/// `photo_url` field of a reserved evidences row, which survives even when
/// blob storage is locked down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupStrategy {
    Blob,
    #[default]
    SentinelRow,
}

/// Mirrors the diary list into a secondary location so a drifted or damaged
/// diary table does not mean data loss.
#[derive(Debug)]
pub struct DiaryBackup {
    strategy: BackupStrategy,
}

impl DiaryBackup {
    pub fn new(strategy: BackupStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> BackupStrategy {
        self.strategy
    }

    /// Writes a fresh backup of the whole list. Best-effort: failures are
    /// logged and reported as `false`, never raised.
    pub async fn save(&self, remote: &RemoteStore, entries: &[DiaryEntry]) -> bool {
        let payload = match serde_json::to_string(entries) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Diary backup serialization failed");
                return false;
            }
        };
        match self.strategy {
            BackupStrategy::Blob => {
                match remote
                    .put_object(
                        DIARY_BACKUP_OBJECT,
                        "application/json",
                        payload.into_bytes(),
                        true,
                    )
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Blob diary backup failed");
                        false
                    }
                }
            }
            BackupStrategy::SentinelRow => {
                // Delete-then-insert, never patch: a fresh row can't be left
                // half-written, and stale duplicates are cleared up front.
                remote
                    .delete_rows(Table::Evidences, "task_name", DIARY_BACKUP_TASK)
                    .await;
                let sentinel = EvidenceEntry::new(DIARY_BACKUP_TASK, &payload);
                remote.create_evidence(&sentinel).await.is_some()
            }
        }
    }

    /// Recovers the most recent backup, or `None` when no usable backup
    /// exists. Malformed payloads read as "no backup", never an error — the
    /// document may have been written by an earlier schema generation.
    pub async fn fetch(&self, remote: &RemoteStore) -> Option<Vec<DiaryEntry>> {
        match self.strategy {
            BackupStrategy::Blob => {
                let document = remote.fetch_object(DIARY_BACKUP_OBJECT).await?;
                diary::entries_from_loose(&document)
            }
            BackupStrategy::SentinelRow => {
                let payload = remote.latest_sentinel_payload().await?;
                let document: Value = serde_json::from_str(&payload).ok()?;
                diary::entries_from_loose(&document)
            }
        }
    }
}

impl RemoteStore {
    /// Payload of the most recent sentinel backup row, if any.
    pub(crate) async fn latest_sentinel_payload(&self) -> Option<String> {
        let rows = self
            .query_rows(
                Table::Evidences,
                &[
                    ("select", "photo_url,created_at"),
                    ("task_name", &format!("eq.{DIARY_BACKUP_TASK}")),
                    ("order", "created_at.desc"),
                    ("limit", "1"),
                ],
            )
            .await?;
        rows.into_iter()
            .next()
            .and_then(|row| row.get("photo_url").and_then(Value::as_str).map(str::to_string))
    }
}
