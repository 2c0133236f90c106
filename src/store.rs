//! Durable credential storage
//!
//! One SQLite file per deployment, holding a single bucketed key/value table.
//! The WhatsApp storage traits are layered on top in `whatsapp::backend`.
//! Every write is an upsert that has committed by the time it returns; a
//! failed write is also reported to the supervisor so it shows up in the
//! connection status.

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::session::{EventSink, SessionEvent};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS credentials (
        bucket      TEXT NOT NULL,
        key         BLOB NOT NULL,
        value       BLOB NOT NULL,
        updated_at  INTEGER NOT NULL,
        PRIMARY KEY (bucket, key)
    )
"#;

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
    path: PathBuf,
    events: Option<EventSink>,
}

impl CredentialStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session directory: {:?}", parent))?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .with_context(|| format!("Failed to open credential store: {:?}", path))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create credential table")?;

        tracing::debug!("Credential store opened at {:?}", path);
        Ok(Self {
            pool,
            path: path.to_path_buf(),
            events: None,
        })
    }

    /// A handle sharing this pool that reports write failures to `events`.
    pub fn with_events(&self, events: EventSink) -> Self {
        Self {
            pool: self.pool.clone(),
            path: self.path.clone(),
            events: Some(events),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO credentials (bucket, key, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(bucket, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(bucket)
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;
        self.reported(bucket, result.map(|_| ()))
    }

    pub async fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row = sqlx::query("SELECT value FROM credentials WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// All entries of a bucket, in key order.
    pub async fn list(&self, bucket: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, sqlx::Error> {
        let rows = sqlx::query("SELECT key, value FROM credentials WHERE bucket = ? ORDER BY key")
            .bind(bucket)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("key"), r.get("value")))
            .collect())
    }

    pub async fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM credentials WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(&self.pool)
            .await;
        self.reported(bucket, result.map(|_| ()))
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM credentials WHERE bucket = ?")
            .bind(bucket)
            .execute(&self.pool)
            .await;
        self.reported(bucket, result.map(|_| ()))
    }

    /// Drop every stored credential, leaving an empty store behind.
    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM credentials")
            .execute(&self.pool)
            .await;
        self.reported("*", result.map(|_| ()))
    }

    fn reported(&self, bucket: &str, result: Result<(), sqlx::Error>) -> Result<(), sqlx::Error> {
        if let Err(ref e) = result {
            tracing::error!("Credential write to '{}' failed: {}", bucket, e);
            if let Some(events) = &self.events {
                events.emit(SessionEvent::CredentialsFailed(format!("{}: {}", bucket, e)));
            }
        }
        result
    }

    /// Delete the store file and its WAL side files. Missing files are fine.
    ///
    /// Returns true if the main database file existed.
    pub fn remove_files(path: &Path) -> anyhow::Result<bool> {
        let existed = path.exists();
        for suffix in ["", "-wal", "-shm"] {
            let mut name = path.as_os_str().to_os_string();
            name.push(suffix);
            let file = PathBuf::from(name);
            match std::fs::remove_file(&file) {
                Ok(()) => tracing::debug!("Removed {:?}", file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {:?}", file));
                }
            }
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    async fn test_store(dir: &TempDir) -> CredentialStore {
        CredentialStore::open(&dir.path().join("session").join("credentials.db"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir).await;

        store.put("identity", b"alice", b"k1").await.unwrap();
        store.put("identity", b"alice", b"k2").await.unwrap();
        assert_eq!(
            store.get("identity", b"alice").await.unwrap(),
            Some(b"k2".to_vec())
        );
        assert!(store.get("session", b"alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete_bucket() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir).await;

        store.put("forget:g1", b"u2", b"").await.unwrap();
        store.put("forget:g1", b"u1", b"").await.unwrap();
        store.put("forget:g2", b"u3", b"").await.unwrap();

        let keys: Vec<Vec<u8>> = store
            .list("forget:g1")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"u1".to_vec(), b"u2".to_vec()]);

        store.delete_bucket("forget:g1").await.unwrap();
        assert!(store.list("forget:g1").await.unwrap().is_empty());
        assert_eq!(store.list("forget:g2").await.unwrap().len(), 1);

        store.delete("forget:g2", b"u3").await.unwrap();
        assert!(store.list("forget:g2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_empties_every_bucket() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir).await;

        store.put("device", b"1", b"paired").await.unwrap();
        store.put("identity", b"alice", b"k1").await.unwrap();
        store.clear().await.unwrap();

        assert!(store.get("device", b"1").await.unwrap().is_none());
        assert!(store.list("identity").await.unwrap().is_empty());
        store.put("device", b"1", b"again").await.unwrap();
        assert!(store.get("device", b"1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = test_store(&dir).await;
            store.put("device", b"1", b"paired").await.unwrap();
            store.pool.close().await;
        }
        let store = test_store(&dir).await;
        assert_eq!(
            store.get("device", b"1").await.unwrap(),
            Some(b"paired".to_vec())
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = test_store(&dir).await.with_events(EventSink::new(7, tx));

        store.pool.close().await;
        assert!(store.put("session", b"bob", b"x").await.is_err());

        let (generation, event) = rx.try_recv().unwrap();
        assert_eq!(generation, 7);
        assert!(matches!(event, SessionEvent::CredentialsFailed(msg) if msg.starts_with("session")));
    }

    #[tokio::test]
    async fn test_remove_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session").join("credentials.db");
        {
            let store = CredentialStore::open(&path).await.unwrap();
            store.put("device", b"1", b"paired").await.unwrap();
            store.pool.close().await;
        }
        assert!(CredentialStore::remove_files(&path).unwrap());
        assert!(!path.exists());
        assert!(!CredentialStore::remove_files(&path).unwrap());
    }
}
