use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::id_to_string;

/// One emotional-diary record, in the shape the application works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryEntry {
    pub id: String,
    pub date: String,
    pub situation: String,
    pub emotions: String,
    pub automatic_thoughts: String,
    /// AI-generated text, absent until enrichment completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub created_at: i64,
}

impl DiaryEntry {
    pub fn new(date: &str, situation: &str, emotions: &str, automatic_thoughts: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date: date.to_string(),
            situation: situation.to_string(),
            emotions: emotions.to_string(),
            automatic_thoughts: automatic_thoughts.to_string(),
            insight: None,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Converts the entry into its wire row. Total: every field maps.
    pub fn to_row(&self) -> DiaryRow {
        DiaryRow {
            id: if self.id.is_empty() {
                None
            } else {
                Some(Value::String(self.id.clone()))
            },
            fecha: Some(self.date.clone()),
            situacion: Some(self.situation.clone()),
            emociones: Some(self.emotions.clone()),
            pensamientos_automaticos: Some(self.automatic_thoughts.clone()),
            insight: self.insight.clone(),
            created_at: Some(self.created_at),
        }
    }
}

/// The diary table's wire shape. The table predates the app's naming
/// conventions: columns are Spanish snake_case and `id` may be a number or a
/// uuid string depending on the table generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub situacion: Option<String>,
    #[serde(default)]
    pub emociones: Option<String>,
    #[serde(default)]
    pub pensamientos_automaticos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl DiaryRow {
    pub fn into_entry(self) -> DiaryEntry {
        DiaryEntry {
            id: id_to_string(self.id.as_ref()),
            date: self.fecha.unwrap_or_default(),
            situation: self.situacion.unwrap_or_default(),
            emotions: self.emociones.unwrap_or_default(),
            automatic_thoughts: self.pensamientos_automaticos.unwrap_or_default(),
            insight: self.insight,
            created_at: self
                .created_at
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
        }
    }
}

/// Most-recent-first, the only order the diary list is ever shown in.
pub fn sort_newest_first(entries: &mut [DiaryEntry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn loose_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn loose_i64(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| obj.get(*k)).and_then(|v| v.as_i64())
}

/// Parses one diary entry from a backup payload, accepting every field
/// casing a previous schema generation may have written.
pub fn entry_from_loose(value: &Value) -> Option<DiaryEntry> {
    let obj = value.as_object()?;
    Some(DiaryEntry {
        id: id_to_string(obj.get("id")),
        date: loose_str(obj, &["date", "fecha"]).unwrap_or_default(),
        situation: loose_str(obj, &["situation", "situacion"]).unwrap_or_default(),
        emotions: loose_str(obj, &["emotions", "emociones"]).unwrap_or_default(),
        automatic_thoughts: loose_str(
            obj,
            &[
                "automaticThoughts",
                "automatic_thoughts",
                "pensamientosAutomaticos",
                "pensamientos_automaticos",
            ],
        )
        .unwrap_or_default(),
        insight: loose_str(obj, &["insight"]),
        created_at: loose_i64(obj, &["createdAt", "created_at"]).unwrap_or_default(),
    })
}

/// Parses a whole backup document. Non-array payloads and malformed entries
/// mean "no backup available", never an error.
pub fn entries_from_loose(value: &Value) -> Option<Vec<DiaryEntry>> {
    let items = value.as_array()?;
    let mut entries: Vec<DiaryEntry> = items.iter().filter_map(entry_from_loose).collect();
    sort_newest_first(&mut entries);
    Some(entries)
}
