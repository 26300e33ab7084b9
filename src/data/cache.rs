use rusqlite::{params, Connection};
use tracing::warn;

/// Persistent string-to-string cache backing the chart session.
///
/// Keys are namespaced by market slug: `bets_<slug>` holds the fetched
/// trade history as JSON, `annotations_<slug>` holds the codec token,
/// `zoom_<slug>` holds the raw viewport JSON.
pub struct KvCache {
    conn: Connection,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("cache read failed: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("failed to open cache at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl KvCache {
    pub fn open(db_path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path).map_err(|source| CacheError::Open {
            path: db_path.to_string(),
            source,
        })?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(CacheError::Write)?;

        Ok(Self { conn })
    }

    /// In-memory cache for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|source| CacheError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT NOT NULL);",
        )
        .map_err(CacheError::Write)?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                warn!("cache read for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Upsert. A failed write (quota, locked file) is the caller's signal
    /// that persistence has degraded; in-memory state must not roll back.
    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(CacheError::Write)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(CacheError::Write)?;
        Ok(())
    }

    pub fn bets_key(slug: &str) -> String {
        format!("bets_{}", slug)
    }

    pub fn annotations_key(slug: &str) -> String {
        format!("annotations_{}", slug)
    }

    pub fn zoom_key(slug: &str) -> String {
        format!("zoom_{}", slug)
    }

    /// Drop the frozen trade history for a slug so the next fetch goes to
    /// the network again. Annotations and zoom are left alone.
    pub fn bust_bets(&self, slug: &str) -> Result<(), CacheError> {
        self.remove(&Self::bets_key(slug))
    }
}
