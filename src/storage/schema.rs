use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::types::DatabaseError;

/// Default prefix of public URLs handed out for locally stored blobs.
pub const DEFAULT_PUBLIC_URL_BASE: &str = "sqlite://blobs";

// ============================================================================
// Database
// ============================================================================

/// Local SQLite store: the facts table, a blob table standing in for the
/// image container, and the preference key-value table.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    pub(crate) public_url_base: Arc<str>,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Set database file permissions BEFORE pool creation
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "SEC-010: Failed to set database file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite will report the error at connect_with.
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // Shared-cache in-memory databases take table locks that ignore
        // busy_timeout; a single connection serializes concurrent tasks instead.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self {
            pool,
            public_url_base: Arc::from(DEFAULT_PUBLIC_URL_BASE),
        };
        db.migrate()
            .await
            .map_err(|e| match DatabaseError::from_sqlx(e) {
                DatabaseError::Other(e) => DatabaseError::Migration(e.to_string()),
                locked => locked,
            })?;
        Ok(db)
    }

    /// Replace the prefix used by `public_url`.
    pub fn with_public_url_base(mut self, base: &str) -> Self {
        self.public_url_base = Arc::from(base.trim_end_matches('/'));
        self
    }

    /// Close every pooled connection. Later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Column names mirror the remote table's wire names in snake case.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                id INTEGER PRIMARY KEY,
                created_at INTEGER NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                category TEXT NOT NULL,
                image_url TEXT NOT NULL DEFAULT '',
                votes_interesting INTEGER NOT NULL DEFAULT 0 CHECK (votes_interesting >= 0),
                votes_mindblowing INTEGER NOT NULL DEFAULT 0 CHECK (votes_mindblowing >= 0),
                votes_false INTEGER NOT NULL DEFAULT 0 CHECK (votes_false >= 0)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_facts_category ON facts(category)")
            .execute(&mut *tx)
            .await?;
        // Feed order: most interesting first, ties by id
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_facts_interesting ON facts(votes_interesting DESC, id)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fact_images (
                container TEXT NOT NULL,
                name TEXT NOT NULL,
                bytes BLOB NOT NULL,
                content_type TEXT NOT NULL,
                cache_control TEXT NOT NULL,
                uploaded_at INTEGER NOT NULL,
                PRIMARY KEY (container, name)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                key TEXT PRIMARY KEY NOT NULL CHECK (length(key) > 0),
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("public_url_base", &self.public_url_base)
            .finish_non_exhaustive()
    }
}
