use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::{IndexCommit, MetadataStore};
use crate::domain::{DomainError, FileRecord, Language};

/// Bump when the table layout changes; an older stored version wipes the
/// index tables and forces a rebuild on the next `/index`.
const SCHEMA_VERSION: &str = "1";

/// Row cap for the rewrite cache; eviction is LRU by `used_at`.
const REWRITE_CACHE_CAP: usize = 512;

/// Per-repository DuckDB metadata store: file hashes, chunk payloads, the
/// three content-addressed caches, and the `meta` table.
pub struct DuckdbMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckdbMetadataStore {
    pub fn open(path: &Path) -> Result<Self, DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DomainError::storage(format!("Failed to open metadata store: {}", e)))?;
        Self::initialize(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DomainError::storage(format!("Failed to open in-memory store: {}", e)))?;
        Self::initialize(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), DomainError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                language TEXT NOT NULL,
                size_bytes BIGINT NOT NULL,
                last_indexed_at BIGINT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);

            CREATE TABLE IF NOT EXISTS embedding_cache (
                key TEXT PRIMARY KEY,
                vector TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS summary_cache (
                key TEXT PRIMARY KEY,
                summary TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rewrite_cache (
                key TEXT PRIMARY KEY,
                rewritten TEXT NOT NULL,
                used_at BIGINT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize metadata schema: {}", e)))?;

        Self::migrate(conn)?;
        debug!("Metadata store initialized");
        Ok(())
    }

    /// One-shot migration: an older schema wipes index state so the next
    /// run rebuilds it; caches are dropped with it since their format may
    /// have changed too.
    fn migrate(conn: &Connection) -> Result<(), DomainError> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .unwrap_or(None);

        match stored.as_deref() {
            Some(SCHEMA_VERSION) => {}
            Some(old) => {
                warn!(
                    "Metadata schema {} is older than {}; wiping index state",
                    old, SCHEMA_VERSION
                );
                conn.execute_batch(
                    "DELETE FROM files; DELETE FROM chunks; DELETE FROM embedding_cache; \
                     DELETE FROM summary_cache; DELETE FROM rewrite_cache; DELETE FROM meta;",
                )
                .map_err(|e| DomainError::storage(format!("Migration wipe failed: {}", e)))?;
                Self::set_schema_version(conn)?;
            }
            None => Self::set_schema_version(conn)?,
        }
        Ok(())
    }

    fn set_schema_version(conn: &Connection) -> Result<(), DomainError> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![SCHEMA_VERSION],
        )
        .map_err(|e| DomainError::storage(format!("Failed to store schema version: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for DuckdbMetadataStore {
    async fn list_files(&self) -> Result<Vec<FileRecord>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT path, content_hash, language, size_bytes, last_indexed_at FROM files")
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    path: row.get::<_, String>(0)?,
                    content_hash: row.get::<_, String>(1)?,
                    language: Language::parse(&row.get::<_, String>(2)?),
                    size_bytes: row.get::<_, i64>(3)? as u64,
                    last_indexed_at: row.get::<_, i64>(4)?,
                })
            })
            .map_err(|e| DomainError::storage(format!("Failed to query files: {}", e)))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?);
        }
        Ok(files)
    }

    async fn chunk_ids_for_files(&self, paths: &[String]) -> Result<Vec<String>, DomainError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT chunk_id FROM chunks WHERE file_path = ?")
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;

        let mut ids = Vec::new();
        for path in paths {
            let rows = stmt
                .query_map(params![path], |row| row.get::<_, String>(0))
                .map_err(|e| DomainError::storage(format!("Failed to query chunk ids: {}", e)))?;
            for row in rows {
                ids.push(row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?);
            }
        }
        Ok(ids)
    }

    async fn list_chunk_ids(&self) -> Result<Vec<String>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT chunk_id FROM chunks")
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| DomainError::storage(format!("Failed to query chunk ids: {}", e)))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?);
        }
        Ok(ids)
    }

    async fn file_count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| DomainError::storage(format!("Failed to count files: {}", e)))
    }

    async fn chunk_count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| DomainError::storage(format!("Failed to count chunks: {}", e)))
    }

    async fn commit_index_run(&self, commit: IndexCommit) -> Result<(), DomainError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut delete_chunk = tx
                .prepare("DELETE FROM chunks WHERE chunk_id = ?")
                .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
            for id in &commit.delete_chunk_ids {
                delete_chunk
                    .execute(params![id])
                    .map_err(|e| DomainError::storage(format!("Failed to delete chunk: {}", e)))?;
            }

            let mut delete_file = tx
                .prepare("DELETE FROM files WHERE path = ?")
                .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
            for path in &commit.delete_files {
                delete_file
                    .execute(params![path])
                    .map_err(|e| DomainError::storage(format!("Failed to delete file: {}", e)))?;
            }

            let mut upsert_file = tx
                .prepare(
                    "INSERT OR REPLACE INTO files \
                     (path, content_hash, language, size_bytes, last_indexed_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
            for file in &commit.upsert_files {
                upsert_file
                    .execute(params![
                        file.path,
                        file.content_hash,
                        file.language.as_str(),
                        file.size_bytes as i64,
                        file.last_indexed_at,
                    ])
                    .map_err(|e| DomainError::storage(format!("Failed to save file: {}", e)))?;
            }

            let mut upsert_chunk = tx
                .prepare("INSERT OR REPLACE INTO chunks (chunk_id, file_path, data) VALUES (?, ?, ?)")
                .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
            for chunk in &commit.upsert_chunks {
                let data = serde_json::to_string(chunk)
                    .map_err(|e| DomainError::storage(format!("Failed to serialize chunk: {}", e)))?;
                upsert_chunk
                    .execute(params![chunk.chunk_id, chunk.path, data])
                    .map_err(|e| DomainError::storage(format!("Failed to save chunk: {}", e)))?;
            }

            let mut set_meta = tx
                .prepare("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
                .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
            for (key, value) in [
                ("last_indexed_at", commit.last_indexed_at.to_string()),
                ("embedding_model", commit.embedding_model.clone()),
                ("embedding_dim", commit.embedding_dim.to_string()),
            ] {
                set_meta
                    .execute(params![key, value])
                    .map_err(|e| DomainError::storage(format!("Failed to save meta: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit index run: {}", e)))?;

        debug!(
            "Committed index run: +{} files, -{} files, +{} chunks, -{} chunks",
            commit.upsert_files.len(),
            commit.delete_files.len(),
            commit.upsert_chunks.len(),
            commit.delete_chunk_ids.len()
        );
        Ok(())
    }

    async fn clear_index(&self) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "DELETE FROM files; DELETE FROM chunks; \
             DELETE FROM meta WHERE key = 'last_indexed_at';",
        )
        .map_err(|e| DomainError::storage(format!("Failed to clear index state: {}", e)))?;
        Ok(())
    }

    async fn embedding_cache_get(&self, key: &str) -> Result<Option<Vec<f32>>, DomainError> {
        let conn = self.conn.lock().await;
        let stored: Option<String> = conn
            .query_row(
                "SELECT vector FROM embedding_cache WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .unwrap_or(None);

        match stored {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| DomainError::storage(format!("Corrupt cached embedding: {}", e))),
            None => Ok(None),
        }
    }

    async fn embedding_cache_put(&self, key: &str, vector: &[f32]) -> Result<(), DomainError> {
        let json = serde_json::to_string(vector)
            .map_err(|e| DomainError::storage(format!("Failed to serialize embedding: {}", e)))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO embedding_cache (key, vector) VALUES (?, ?)",
            params![key, json],
        )
        .map_err(|e| DomainError::storage(format!("Failed to cache embedding: {}", e)))?;
        Ok(())
    }

    async fn summary_cache_get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                "SELECT summary FROM summary_cache WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .unwrap_or(None))
    }

    async fn summary_cache_put(&self, key: &str, summary: &str) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO summary_cache (key, summary) VALUES (?, ?)",
            params![key, summary],
        )
        .map_err(|e| DomainError::storage(format!("Failed to cache summary: {}", e)))?;
        Ok(())
    }

    async fn rewrite_cache_get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let conn = self.conn.lock().await;
        let found: Option<String> = conn
            .query_row(
                "SELECT rewritten FROM rewrite_cache WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .unwrap_or(None);

        if found.is_some() {
            conn.execute(
                "UPDATE rewrite_cache SET used_at = ? WHERE key = ?",
                params![unix_now(), key],
            )
            .map_err(|e| DomainError::storage(format!("Failed to touch rewrite entry: {}", e)))?;
        }
        Ok(found)
    }

    async fn rewrite_cache_put(&self, key: &str, rewritten: &str) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO rewrite_cache (key, rewritten, used_at) VALUES (?, ?, ?)",
            params![key, rewritten, unix_now()],
        )
        .map_err(|e| DomainError::storage(format!("Failed to cache rewrite: {}", e)))?;

        // LRU bound: drop the least recently used rows beyond the cap.
        conn.execute(
            &format!(
                "DELETE FROM rewrite_cache WHERE key IN ( \
                     SELECT key FROM rewrite_cache ORDER BY used_at DESC OFFSET {} \
                 )",
                REWRITE_CACHE_CAP
            ),
            [],
        )
        .map_err(|e| DomainError::storage(format!("Failed to trim rewrite cache: {}", e)))?;
        Ok(())
    }

    async fn meta_get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .unwrap_or(None))
    }

    async fn meta_set(&self, key: &str, value: &str) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
            params![key, value],
        )
        .map_err(|e| DomainError::storage(format!("Failed to save meta: {}", e)))?;
        Ok(())
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
