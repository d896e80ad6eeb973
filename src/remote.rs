use chrono::Utc;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backup::DIARY_BACKUP_TASK;
use crate::config::CloudConfig;
use crate::error::AppResult;
use crate::models::diary::{self, DiaryEntry, DiaryRow};
use crate::models::diet::DietPlan;
use crate::models::evidence::{self, EvidenceEntry, EvidenceRow};

/// The three logical tables behind the PostgREST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Diary,
    Diet,
    Evidences,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Diary => "diary",
            Table::Diet => "diet",
            Table::Evidences => "evidences",
        }
    }
}

/// Result of a manual connectivity probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

/// The diet table is a single-row singleton keyed by a fixed id.
#[derive(Debug, serde::Deserialize)]
struct DietRow {
    #[serde(default)]
    plan: Option<Value>,
}

/// Issues authenticated REST calls against the remote store and normalizes
/// responses into entity shapes.
///
/// Every operation short-circuits when the cloud is disabled and maps
/// transport or status failures to `None`/`false`/empty results — failures
/// are logged here and never propagated to the caller.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    http: reqwest::Client,
    config: CloudConfig,
}

impl RemoteStore {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    fn active(&self) -> bool {
        self.config.is_active()
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.config.url, table.as_str())
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.key)
            .bearer_auth(&self.config.key)
    }

    async fn list<T: DeserializeOwned>(&self, table: Table) -> AppResult<Vec<T>> {
        let rows = self
            .authed(self.http.get(self.rest_url(table)))
            .query(&[("select", "*")])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<T>>()
            .await?;
        Ok(rows)
    }

    /// Fetches the diary list. `None` when the cloud is disabled (no network
    /// call is made); an empty list when the remote fails — for the diary,
    /// absence just means "no rows".
    pub async fn fetch_diary(&self) -> Option<Vec<DiaryEntry>> {
        if !self.active() {
            return None;
        }
        match self.list::<DiaryRow>(Table::Diary).await {
            Ok(rows) => {
                let mut entries: Vec<DiaryEntry> =
                    rows.into_iter().map(DiaryRow::into_entry).collect();
                diary::sort_newest_first(&mut entries);
                Some(entries)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Diary fetch failed");
                Some(Vec::new())
            }
        }
    }

    /// Fetches the diet plan. The table is a singleton, but duplicate rows
    /// have been observed; the last row wins. `None` when disabled, on
    /// failure, or when no plan exists — for the diet, absence is meaningful.
    pub async fn fetch_diet(&self) -> Option<DietPlan> {
        if !self.active() {
            return None;
        }
        match self.list::<DietRow>(Table::Diet).await {
            Ok(rows) => rows
                .into_iter()
                .last()
                .and_then(|row| row.plan)
                .and_then(|plan| serde_json::from_value(plan).ok()),
            Err(e) => {
                tracing::warn!(error = %e, "Diet fetch failed");
                None
            }
        }
    }

    /// Fetches evidence entries, newest first. Rows carrying the reserved
    /// backup task name are internal and never surface to callers.
    pub async fn fetch_evidences(&self) -> Option<Vec<EvidenceEntry>> {
        if !self.active() {
            return None;
        }
        match self.list::<EvidenceRow>(Table::Evidences).await {
            Ok(rows) => {
                let mut entries: Vec<EvidenceEntry> = rows
                    .into_iter()
                    .map(EvidenceRow::into_entry)
                    .filter(|e| e.task_name != DIARY_BACKUP_TASK)
                    .collect();
                evidence::sort_newest_first(&mut entries);
                Some(entries)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Evidences fetch failed");
                Some(Vec::new())
            }
        }
    }

    /// Uploads a photo under a collision-resistant object name and returns
    /// its public URL.
    pub async fn upload_photo(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Option<String> {
        if !self.active() {
            return None;
        }
        let object = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_object_name(file_name)
        );
        match self.put_object(&object, mime, bytes, false).await {
            Ok(()) => Some(self.public_object_url(&object)),
            Err(e) => {
                tracing::warn!(error = %e, object, "Photo upload failed");
                None
            }
        }
    }

    pub(crate) async fn put_object(
        &self,
        object: &str,
        mime: &str,
        bytes: Vec<u8>,
        upsert: bool,
    ) -> AppResult<()> {
        let url = format!("{}/storage/v1/object/evidences/{}", self.config.url, object);
        let mut builder = self
            .authed(self.http.post(&url))
            .header("Content-Type", mime);
        if upsert {
            builder = builder.header("x-upsert", "true");
        }
        builder.body(bytes).send().await?.error_for_status()?;
        Ok(())
    }

    pub(crate) fn public_object_url(&self, object: &str) -> String {
        format!(
            "{}/storage/v1/object/public/evidences/{}",
            self.config.url, object
        )
    }

    pub(crate) async fn fetch_object(&self, object: &str) -> Option<Value> {
        if !self.active() {
            return None;
        }
        let url = self.public_object_url(object);
        let result = async {
            self.authed(self.http.get(&url))
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        }
        .await;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, object, "Object fetch failed");
                None
            }
        }
    }

    /// Inserts an evidence row and returns the created representation, or
    /// `None` if the server returned no row.
    pub async fn create_evidence(&self, entry: &EvidenceEntry) -> Option<EvidenceEntry> {
        if !self.active() {
            return None;
        }
        let result = async {
            self.authed(self.http.post(self.rest_url(Table::Evidences)))
                .header("Prefer", "return=representation")
                .json(entry)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<EvidenceRow>>()
                .await
        }
        .await;
        match result {
            Ok(rows) => rows.into_iter().next().map(EvidenceRow::into_entry),
            Err(e) => {
                tracing::warn!(error = %e, "Evidence create failed");
                None
            }
        }
    }

    /// Deletes rows matching `column = value`. A 2xx status is treated as
    /// success, which is a weak guarantee: row-level-security policies can
    /// silently filter the delete down to zero affected rows.
    pub async fn delete_rows(&self, table: Table, column: &str, value: &str) -> bool {
        if !self.active() {
            return false;
        }
        let result = self
            .authed(self.http.delete(self.rest_url(table)))
            .query(&[(column, format!("eq.{value}"))])
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, table = table.as_str(), column, "Delete failed");
                false
            }
        }
    }

    /// Probes whether any row matches `column = value`. Status 2xx alone is
    /// no proof a delete took effect, so deletes re-check through here.
    pub async fn row_exists(&self, table: Table, column: &str, value: &str) -> bool {
        if !self.active() {
            return false;
        }
        let filter = format!("eq.{value}");
        let result = async {
            self.authed(self.http.get(self.rest_url(table)))
                .query(&[("select", column), (column, filter.as_str()), ("limit", "1")])
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Value>>()
                .await
        }
        .await;
        match result {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, table = table.as_str(), column, "Existence check failed");
                false
            }
        }
    }

    /// Raw filtered read, for callers that need PostgREST query operators
    /// beyond a plain listing.
    pub(crate) async fn query_rows(
        &self,
        table: Table,
        params: &[(&str, &str)],
    ) -> Option<Vec<Value>> {
        if !self.active() {
            return None;
        }
        let result = async {
            self.authed(self.http.get(self.rest_url(table)))
                .query(params)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Value>>()
                .await
        }
        .await;
        match result {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::warn!(error = %e, table = table.as_str(), "Filtered read failed");
                None
            }
        }
    }

    /// Evidence delete protocol. The table has gone through schema revisions
    /// where `id` may be absent or mismatched and `photo_url` is the only
    /// reliable key, so either key may be stale:
    ///
    /// 1. delete by `id`;
    /// 2. if no row with this `photo_url` remains, done;
    /// 3. otherwise delete by `photo_url`;
    /// 4. the final existence check decides the overall result.
    pub async fn delete_evidence(&self, entry: &EvidenceEntry) -> bool {
        if !self.active() {
            return false;
        }
        if !entry.id.is_empty() {
            self.delete_rows(Table::Evidences, "id", &entry.id).await;
        }
        if !self
            .row_exists(Table::Evidences, "photo_url", &entry.photo_url)
            .await
        {
            return true;
        }
        self.delete_rows(Table::Evidences, "photo_url", &entry.photo_url)
            .await;
        !self
            .row_exists(Table::Evidences, "photo_url", &entry.photo_url)
            .await
    }

    pub async fn delete_diary(&self, id: &str) -> bool {
        self.delete_rows(Table::Diary, "id", id).await
    }

    async fn patch_diary_row(&self, id: &str, body: &Value) -> AppResult<Vec<Value>> {
        let rows = self
            .authed(self.http.patch(self.rest_url(Table::Diary)))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Value>>()
            .await?;
        Ok(rows)
    }

    async fn insert_diary_row(&self, body: &Value) -> bool {
        let result = self
            .authed(self.http.post(self.rest_url(Table::Diary)))
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Diary insert failed");
                false
            }
        }
    }

    /// Syncs the entire diary list. Per entry: PATCH keyed by id; when the
    /// PATCH returns no updated row (the entry never existed remotely) or the
    /// entry has no id, fall back to POST. Success requires every entry to
    /// have synced by one path or the other.
    pub async fn sync_diary(&self, entries: &[DiaryEntry]) -> bool {
        if !self.active() {
            return false;
        }
        let mut all_synced = true;
        for entry in entries {
            let body = match serde_json::to_value(entry.to_row()) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(error = %e, id = %entry.id, "Diary row serialization failed");
                    all_synced = false;
                    continue;
                }
            };

            let mut synced = false;
            if !entry.id.is_empty() {
                match self.patch_diary_row(&entry.id, &body).await {
                    Ok(rows) => synced = !rows.is_empty(),
                    Err(e) => {
                        tracing::warn!(error = %e, id = %entry.id, "Diary patch failed, trying insert");
                    }
                }
            }
            if !synced {
                synced = self.insert_diary_row(&body).await;
            }
            all_synced &= synced;
        }
        all_synced
    }

    /// Upserts the singleton diet row.
    pub async fn sync_diet(&self, plan: &DietPlan) -> bool {
        if !self.active() {
            return false;
        }
        let body = serde_json::json!({ "id": 1, "plan": plan });
        let result = self
            .authed(self.http.post(self.rest_url(Table::Diet)))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Diet sync failed");
                false
            }
        }
    }

    /// Manual connectivity probe for the settings screen.
    pub async fn test_connection(&self) -> ConnectionStatus {
        if !self.active() {
            return ConnectionStatus {
                success: false,
                message: "Cloud sync is disabled".into(),
            };
        }
        let response = self
            .authed(self.http.get(self.rest_url(Table::Diary)))
            .query(&[("select", "count")])
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => ConnectionStatus {
                success: true,
                message: "Connected to the remote store".into(),
            },
            Ok(r) => {
                let message = r
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "Permission error (401/403)".into());
                ConnectionStatus {
                    success: false,
                    message,
                }
            }
            Err(_) => ConnectionStatus {
                success: false,
                message: "Network error: check the endpoint URL".into(),
            },
        }
    }
}

/// Object names keep alphanumerics and dots; everything else becomes `_`.
/// A millisecond timestamp prefix makes collisions implausible.
pub(crate) fn sanitize_object_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}
