use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::ErrorCode,
    modules::summarizer::{LengthClass, ResultStatus, SourceKind, SummaryResult},
};

pub const MAX_HISTORY_LIMIT: usize = 100;

/// Stored summary result plus its stable identifier.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub result: SummaryResult,
}

/// Append-only, per-user record of summary results.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, user_id: &str, result: SummaryResult) -> Result<HistoryEntry>;

    /// Every entry for the user, most recent first.
    async fn list(&self, user_id: &str) -> Result<Vec<HistoryEntry>>;

    /// At most `limit` entries, most recent first. `limit` is clamped to `1..=100`.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>>;
}

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

/// Process-lifetime store. Writers are serialized through the lock so concurrent appends for
/// the same user never drop entries. Each user's entries are kept in `created_at` order, with
/// ties in insertion order.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<HashMap<String, Vec<HistoryEntry>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, user_id: &str, result: SummaryResult) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            result,
        };
        let created_at = entry.result.created_at();
        let mut guard = self.entries.write().await;
        let entries = guard.entry(user_id.to_string()).or_default();
        let position = entries.partition_point(|existing| existing.result.created_at() <= created_at);
        entries.insert(position, entry.clone());
        Ok(entry)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let guard = self.entries.read().await;
        Ok(guard
            .get(user_id)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let guard = self.entries.read().await;
        Ok(guard
            .get(user_id)
            .map(|entries| entries.iter().rev().take(clamp_limit(limit)).cloned().collect())
            .unwrap_or_default())
    }
}

/// Postgres-backed store; survives restarts.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, user_id, summary_text, length_class, source_kind, original_identifier,
                    status, error_detail, error_code, created_at
             FROM summary_history
             WHERE user_id = $1
             ORDER BY created_at DESC, seq DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load history for user {user_id}"))?;

        Ok(rows.into_iter().filter_map(HistoryRow::into_entry).collect())
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, user_id: &str, result: SummaryResult) -> Result<HistoryEntry> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO summary_history
                (id, user_id, summary_text, length_class, source_kind, original_identifier,
                 status, error_detail, error_code, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(user_id)
        .bind(result.summary_text())
        .bind(result.length_class().as_str())
        .bind(result.source_kind().map(|kind| kind.as_str()))
        .bind(result.original_identifier())
        .bind(result.status().as_str())
        .bind(result.error_detail())
        .bind(result.error_code().map(|code| code.as_str()))
        .bind(result.created_at())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to append history for user {user_id}"))?;

        Ok(HistoryEntry { id, result })
    }

    async fn list(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        self.fetch(user_id, None).await
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.fetch(user_id, Some(clamp_limit(limit) as i64)).await
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    user_id: String,
    summary_text: Option<String>,
    length_class: String,
    source_kind: Option<String>,
    original_identifier: String,
    status: String,
    error_detail: Option<String>,
    error_code: Option<String>,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> Option<HistoryEntry> {
        let id = self.id;
        let length_class = self.length_class.parse::<LengthClass>().ok();
        // A NULL kind is an upload that matched no supported format.
        let source_kind = match self.source_kind.as_deref() {
            None => Some(None),
            Some(raw) => SourceKind::parse(raw).map(Some),
        };
        let status = match self.status.as_str() {
            "success" => Some(ResultStatus::Success),
            "failed" => Some(ResultStatus::Failed),
            _ => None,
        };

        let result = match (length_class, source_kind, status) {
            (Some(length_class), Some(source_kind), Some(status)) => SummaryResult::from_parts(
                self.summary_text,
                length_class,
                source_kind,
                self.original_identifier,
                self.created_at,
                self.user_id,
                status,
                self.error_detail,
                self.error_code.as_deref().map(ErrorCode::from_code),
            ),
            _ => None,
        };

        if result.is_none() {
            warn!(%id, "skipping malformed history row");
        }
        result.map(|result| HistoryEntry { id, result })
    }
}
