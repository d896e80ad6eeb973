use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id_to_string;

/// One achievement photo record. `photo_url` doubles as a fallback identity
/// key: across schema generations `id` has been absent or mismatched, while
/// the uploaded object URL stays stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub id: String,
    pub task_name: String,
    pub photo_url: String,
    /// ISO-8601 timestamp string, as the table stores it.
    pub created_at: String,
}

impl EvidenceEntry {
    pub fn new(task_name: &str, photo_url: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_name: task_name.to_string(),
            photo_url: photo_url.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn created_at_instant(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
    }
}

/// Wire shape of an evidences row. Naming already matches the entity; only
/// the drifting `id` type needs normalizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub task_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl EvidenceRow {
    pub fn into_entry(self) -> EvidenceEntry {
        EvidenceEntry {
            id: id_to_string(self.id.as_ref()),
            task_name: self.task_name.unwrap_or_default(),
            photo_url: self.photo_url.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_default(),
        }
    }
}

/// Most-recent-first by creation time. Unparseable timestamps sink to the end.
pub fn sort_newest_first(entries: &mut [EvidenceEntry]) {
    entries.sort_by(|a, b| b.created_at_instant().cmp(&a.created_at_instant()));
}
