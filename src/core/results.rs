//! Saved results storage using SQLite
//!
//! Explanations, documentation, reviews and chat answers the user chose to keep.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Explanation,
    Documentation,
    Review,
    Chat,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Explanation => "explanation",
            ResultKind::Documentation => "documentation",
            ResultKind::Review => "review",
            ResultKind::Chat => "chat",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "explanation" => ResultKind::Explanation,
            "documentation" => ResultKind::Documentation,
            "review" => ResultKind::Review,
            _ => ResultKind::Chat,
        }
    }
}

/// A stored result with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedResult {
    pub id: String,
    pub kind: ResultKind,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

type ResultRow = (String, String, String, String, String);

impl From<ResultRow> for SavedResult {
    fn from((id, kind, title, content, created_at): ResultRow) -> Self {
        SavedResult {
            id,
            kind: ResultKind::from_db(&kind),
            title,
            content,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

/// Store for saved results
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    /// Open (or create) the SQLite database at the given path
    pub async fn new(db_path: &Path) -> Result<Self, sqlx::Error> {
        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the database schema
    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saved_results (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_saved_results_created
            ON saved_results(created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save a result and return it with its new id
    pub async fn save(
        &self,
        kind: ResultKind,
        title: &str,
        content: &str,
    ) -> Result<SavedResult, sqlx::Error> {
        let result = SavedResult {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO saved_results (id, kind, title, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(kind.as_str())
        .bind(&result.title)
        .bind(&result.content)
        .bind(result.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %result.id, kind = kind.as_str(), "Saved result");
        Ok(result)
    }

    pub async fn get(&self, id: &str) -> Result<Option<SavedResult>, sqlx::Error> {
        let row: Option<ResultRow> = sqlx::query_as(
            r#"
            SELECT id, kind, title, content, created_at
            FROM saved_results
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SavedResult::from))
    }

    /// Most recent results first, optionally of one kind
    pub async fn list(
        &self,
        kind: Option<ResultKind>,
        limit: usize,
    ) -> Result<Vec<SavedResult>, sqlx::Error> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT id, kind, title, content, created_at
            FROM saved_results
            WHERE ?1 IS NULL OR kind = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SavedResult::from).collect())
    }

    /// Search titles and content
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SavedResult>, sqlx::Error> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT id, kind, title, content, created_at
            FROM saved_results
            WHERE title LIKE ?1 OR content LIKE ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(format!("%{}%", query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SavedResult::from).collect())
    }

    /// Delete a result; `false` if it did not exist
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM saved_results WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
