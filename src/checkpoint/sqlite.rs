use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use super::{bounded, CheckpointError, CheckpointStore};

/// All stanzas' checkpoints in one SQLite database.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteCheckpointStore {
    /// Open (creating if needed) the checkpoint database at `path`.
    ///
    /// `":memory:"` opens a private in-memory database. `timeout` bounds
    /// each read and write, including SQLite's wait for a concurrent writer.
    pub async fn open(path: &str, timeout: Duration) -> Result<Self, CheckpointError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file owner-only so there is no window with umask permissions
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(db_path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set checkpoint database permissions");
                }
            } else if db_path.parent().map_or(true, |p| p.as_os_str().is_empty() || p.exists()) {
                // If creation fails, SQLite reports the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&url)?
            .pragma("busy_timeout", timeout.as_millis().to_string());

        // Each in-memory connection is its own database, so keep exactly one.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool, timeout };
        store.migrate().await?;
        tracing::debug!(path = %path, "Opened checkpoint database");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                stanza TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn read(&self, stanza: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        bounded(self.timeout, async {
            let row: Option<(Vec<u8>,)> =
                sqlx::query_as("SELECT data FROM checkpoints WHERE stanza = ?")
                    .bind(stanza)
                    .fetch_optional(&self.pool)
                    .await?;

            Ok(row.map(|(data,)| data))
        })
        .await
    }

    async fn write(&self, stanza: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        bounded(self.timeout, async {
            sqlx::query(
                r#"
                INSERT INTO checkpoints (stanza, data, updated_at)
                VALUES (?, ?, datetime('now'))
                ON CONFLICT(stanza) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
            )
            .bind(stanza)
            .bind(bytes)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }
}
