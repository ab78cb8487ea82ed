use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::ObjectId;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFragment {
    pub session_key: String,
    pub object_id: ObjectId,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every pooled connection to `sqlite::memory:` would see its own database
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn load_fragment(&self, session_key: &str) -> Result<Option<StoredFragment>> {
        let row = sqlx::query(
            "SELECT session_key, fragment, updated_at FROM session_fragments WHERE session_key = ?",
        )
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load session fragment '{session_key}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let fragment: String = row.try_get("fragment")?;
        let Some(object_id) = ObjectId::from_fragment(&fragment) else {
            debug!(session_key, "storage: ignoring blank session fragment");
            return Ok(None);
        };
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Some(StoredFragment {
            session_key: row.try_get("session_key")?,
            object_id,
            updated_at: parse_sqlite_timestamp(&updated_at)?,
        }))
    }

    pub async fn save_fragment(&self, session_key: &str, object_id: &ObjectId) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_fragments (session_key, fragment, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(session_key) DO UPDATE SET
                fragment = excluded.fragment,
                updated_at = excluded.updated_at",
        )
        .bind(session_key)
        .bind(object_id.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save session fragment '{session_key}'"))?;
        Ok(())
    }

    /// Returns whether a fragment was removed.
    pub async fn clear_fragment(&self, session_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session_fragments WHERE session_key = ?")
            .bind(session_key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear session fragment '{session_key}'"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn parse_sqlite_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // CURRENT_TIMESTAMP default format
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("invalid sqlite timestamp '{raw}'"))?;
    Ok(naive.and_utc())
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
