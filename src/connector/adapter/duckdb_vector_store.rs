use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::{ScoredPoint, VectorPoint, VectorStore};
use crate::domain::{Chunk, DomainError};

/// DuckDB vector store. One collection per repository, realized as a
/// fixed-dimension FLOAT array table. When the VSS extension is available
/// an HNSW cosine index accelerates search; otherwise search falls back to
/// an exact scan over `array_cosine_distance`, which is a core function.
pub struct DuckdbVectorStore {
    conn: Arc<Mutex<Connection>>,
    hnsw_available: bool,
}

impl DuckdbVectorStore {
    pub fn open(path: &Path) -> Result<Self, DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DomainError::storage(format!("Failed to open vector store: {}", e)))?;
        let hnsw_available = Self::initialize(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hnsw_available,
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DomainError::storage(format!("Failed to open in-memory store: {}", e)))?;
        let hnsw_available = Self::initialize(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hnsw_available,
        })
    }

    /// Returns whether the HNSW index is available. A missing VSS extension
    /// degrades to exact search, it is not an error.
    fn initialize(conn: &Connection) -> Result<bool, DomainError> {
        let hnsw_available = match conn.execute_batch(
            "INSTALL vss; LOAD vss; SET hnsw_enable_experimental_persistence = true;",
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!("VSS extension unavailable ({}); using exact cosine scan", e);
                false
            }
        };

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (name TEXT PRIMARY KEY, dim BIGINT NOT NULL);",
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize collections table: {}", e)))?;

        debug!("Vector store initialized (hnsw: {})", hnsw_available);
        Ok(hnsw_available)
    }

    fn stored_dim(conn: &Connection, name: &str) -> Option<usize> {
        conn.query_row(
            "SELECT dim FROM collections WHERE name = ?",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .map(|d| Some(d as usize))
        .unwrap_or(None)
    }

    fn create_collection(
        conn: &Connection,
        name: &str,
        dim: usize,
        hnsw: bool,
    ) -> Result<(), DomainError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{name}" (
                chunk_id TEXT PRIMARY KEY,
                vector FLOAT[{dim}] NOT NULL,
                payload TEXT NOT NULL
            );
            "#
        );
        conn.execute_batch(&ddl)
            .map_err(|e| DomainError::storage(format!("Failed to create collection {}: {}", name, e)))?;

        if hnsw {
            let index_ddl = format!(
                "CREATE INDEX IF NOT EXISTS \"{name}_hnsw\" \
                 ON \"{name}\" USING HNSW (vector) WITH (metric = 'cosine');"
            );
            if let Err(e) = conn.execute_batch(&index_ddl) {
                warn!("HNSW index creation failed for {}: {}", name, e);
            }
        }
        conn.execute(
            "INSERT OR REPLACE INTO collections (name, dim) VALUES (?, ?)",
            params![name, dim as i64],
        )
        .map_err(|e| DomainError::storage(format!("Failed to register collection {}: {}", name, e)))?;
        Ok(())
    }

    fn drop_collection_inner(conn: &Connection, name: &str) -> Result<(), DomainError> {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{name}\";"))
            .map_err(|e| DomainError::storage(format!("Failed to drop collection {}: {}", name, e)))?;
        conn.execute("DELETE FROM collections WHERE name = ?", params![name])
            .map_err(|e| DomainError::storage(format!("Failed to unregister collection {}: {}", name, e)))?;
        Ok(())
    }

    /// Renders a vector as a typed DuckDB array literal.
    fn array_literal(vector: &[f32], dim: usize) -> Result<String, DomainError> {
        if vector.len() != dim {
            return Err(DomainError::dimension_mismatch(format!(
                "expected dimension {}, got {}",
                dim,
                vector.len()
            )));
        }
        let mut s = String::with_capacity(vector.len() * 8);
        s.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&format!("{}", v));
        }
        s.push(']');
        s.push_str(&format!("::FLOAT[{}]", dim));
        Ok(s)
    }

    fn require_dim(conn: &Connection, name: &str) -> Result<usize, DomainError> {
        Self::stored_dim(conn, name)
            .ok_or_else(|| DomainError::not_indexed(format!("collection {} does not exist", name)))
    }
}

#[async_trait]
impl VectorStore for DuckdbVectorStore {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<bool, DomainError> {
        let conn = self.conn.lock().await;
        match Self::stored_dim(&conn, name) {
            Some(existing) if existing == dim => Ok(false),
            Some(existing) => {
                warn!(
                    "Collection {} has dimension {}, model needs {}; dropping and recreating",
                    name, existing, dim
                );
                Self::drop_collection_inner(&conn, name)?;
                Self::create_collection(&conn, name, dim, self.hnsw_available)?;
                Ok(true)
            }
            None => {
                Self::create_collection(&conn, name, dim, self.hnsw_available)?;
                Ok(false)
            }
        }
    }

    async fn collection_dim(&self, name: &str) -> Result<Option<usize>, DomainError> {
        let conn = self.conn.lock().await;
        Ok(Self::stored_dim(&conn, name))
    }

    async fn drop_collection(&self, name: &str) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        Self::drop_collection_inner(&conn, name)
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<(), DomainError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let dim = Self::require_dim(&conn, name)?;

        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
        for point in points {
            let literal = Self::array_literal(&point.vector, dim)?;
            let payload = serde_json::to_string(&point.payload)
                .map_err(|e| DomainError::storage(format!("Failed to serialize payload: {}", e)))?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO \"{name}\" (chunk_id, vector, payload) VALUES (?, {literal}, ?)"
                ),
                params![point.chunk_id, payload],
            )
            .map_err(|e| DomainError::storage(format!("Failed to upsert point: {}", e)))?;
        }
        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit upserts: {}", e)))?;

        debug!("Upserted {} points into {}", points.len(), name);
        Ok(())
    }

    async fn delete(&self, name: &str, chunk_ids: &[String]) -> Result<(), DomainError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().await;
        if Self::stored_dim(&conn, name).is_none() {
            return Ok(());
        }
        let mut stmt = conn
            .prepare(&format!("DELETE FROM \"{name}\" WHERE chunk_id = ?"))
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        for id in chunk_ids {
            stmt.execute(params![id])
                .map_err(|e| DomainError::storage(format!("Failed to delete point: {}", e)))?;
        }
        debug!("Deleted {} points from {}", chunk_ids.len(), name);
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPoint>, DomainError> {
        if k == 0 {
            return Ok(vec![]);
        }
        let conn = self.conn.lock().await;
        let dim = Self::require_dim(&conn, name)?;
        if vector.len() != dim {
            return Err(DomainError::dimension_mismatch(format!(
                "query vector dimension {} does not match collection dimension {}",
                vector.len(),
                dim
            )));
        }
        let literal = Self::array_literal(vector, dim)?;

        let sql = format!(
            "SELECT chunk_id, payload, 1.0 - array_cosine_distance(vector, {literal}) AS score \
             FROM \"{name}\" \
             ORDER BY array_cosine_distance(vector, {literal}) \
             LIMIT ?"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare search: {}", e)))?;
        let mut rows = stmt
            .query(params![k as i64])
            .map_err(|e| DomainError::storage(format!("Failed to run search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read search row: {}", e)))?
        {
            let chunk_id: String = row
                .get(0)
                .map_err(|e| DomainError::storage(format!("Failed to read chunk id: {}", e)))?;
            let payload_json: String = row
                .get(1)
                .map_err(|e| DomainError::storage(format!("Failed to read payload: {}", e)))?;
            let similarity: f32 = row
                .get(2)
                .map_err(|e| DomainError::storage(format!("Failed to read score: {}", e)))?;
            let payload: Chunk = serde_json::from_str(&payload_json)
                .map_err(|e| DomainError::storage(format!("Corrupt payload: {}", e)))?;
            results.push(ScoredPoint {
                chunk_id,
                similarity,
                payload,
            });
        }
        Ok(results)
    }

    async fn list_ids(&self, name: &str) -> Result<Vec<String>, DomainError> {
        let conn = self.conn.lock().await;
        if Self::stored_dim(&conn, name).is_none() {
            return Ok(vec![]);
        }
        let mut stmt = conn
            .prepare(&format!("SELECT chunk_id FROM \"{name}\""))
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| DomainError::storage(format!("Failed to list ids: {}", e)))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?);
        }
        Ok(ids)
    }

    async fn count(&self, name: &str) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        if Self::stored_dim(&conn, name).is_none() {
            return Ok(0);
        }
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{name}\""), [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(|e| DomainError::storage(format!("Failed to count points: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkKind};

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            chunk_id: id.to_string(),
            vector,
            payload: Chunk::new("repo", "a.js", 1, 5, id, ChunkKind::Function, "h", 50),
        }
    }

    #[tokio::test]
    async fn ensure_create_search_round_trip() {
        let store = DuckdbVectorStore::in_memory().unwrap();
        let reset = store.ensure_collection("xtrc_test", 3).await.unwrap();
        assert!(!reset);

        store
            .upsert(
                "xtrc_test",
                &[
                    point("a", vec![1.0, 0.0, 0.0]),
                    point("b", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search("xtrc_test", &[1.0, 0.0, 0.0], 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "a");
        assert!(hits[0].similarity > hits[1].similarity);
        assert!((hits[0].similarity - 1.0).abs() < 0.001);
        assert_eq!(hits[0].payload.symbol, "a");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_chunk_id() {
        let store = DuckdbVectorStore::in_memory().unwrap();
        store.ensure_collection("c", 2).await.unwrap();

        store.upsert("c", &[point("a", vec![1.0, 0.0])]).await.unwrap();
        store.upsert("c", &[point("a", vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(store.count("c").await.unwrap(), 1);
        let hits = store.search("c", &[0.0, 1.0], 1).await.unwrap();
        assert!((hits[0].similarity - 1.0).abs() < 0.001, "latest vector wins");
    }

    #[tokio::test]
    async fn dimension_change_resets_collection() {
        let store = DuckdbVectorStore::in_memory().unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", &[point("a", vec![1.0, 0.0])]).await.unwrap();

        let reset = store.ensure_collection("c", 3).await.unwrap();
        assert!(reset);
        assert_eq!(store.count("c").await.unwrap(), 0);
        assert_eq!(store.collection_dim("c").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn delete_removes_points() {
        let store = DuckdbVectorStore::in_memory().unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert("c", &[point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])])
            .await
            .unwrap();

        store.delete("c", &["a".to_string()]).await.unwrap();
        assert_eq!(store.list_ids("c").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_not_indexed() {
        let store = DuckdbVectorStore::in_memory().unwrap();
        let err = store.search("nope", &[1.0], 5).await.unwrap_err();
        assert_eq!(err.code(), "NOT_INDEXED");
    }

    #[tokio::test]
    async fn wrong_query_dimension_is_rejected() {
        let store = DuckdbVectorStore::in_memory().unwrap();
        store.ensure_collection("c", 3).await.unwrap();
        let err = store.search("c", &[1.0, 0.0], 5).await.unwrap_err();
        assert_eq!(err.code(), "INDEX_DIMENSION_MISMATCH");
    }
}
