use async_trait::async_trait;

use crate::domain::{Chunk, DomainError, FileRecord};

/// The write set of one index run, committed as a single transaction.
/// Failure leaves the prior snapshot intact.
#[derive(Debug, Default)]
pub struct IndexCommit {
    pub upsert_files: Vec<FileRecord>,
    pub delete_files: Vec<String>,
    pub upsert_chunks: Vec<Chunk>,
    pub delete_chunk_ids: Vec<String>,
    pub last_indexed_at: i64,
    pub embedding_model: String,
    pub embedding_dim: usize,
}

/// Durable per-repository state: file hashes, chunk metadata, caches, and
/// the `meta` table (model id, schema version, last index time).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn list_files(&self) -> Result<Vec<FileRecord>, DomainError>;

    /// Chunk ids owned by the given repo-relative paths.
    async fn chunk_ids_for_files(&self, paths: &[String]) -> Result<Vec<String>, DomainError>;

    async fn list_chunk_ids(&self) -> Result<Vec<String>, DomainError>;

    async fn file_count(&self) -> Result<u64, DomainError>;

    async fn chunk_count(&self) -> Result<u64, DomainError>;

    /// Applies one index run's write set atomically.
    async fn commit_index_run(&self, commit: IndexCommit) -> Result<(), DomainError>;

    /// Drops all index state (files, chunks) but keeps the caches; used by
    /// `rebuild`.
    async fn clear_index(&self) -> Result<(), DomainError>;

    // Content-addressed caches. Writes commit immediately: entries are
    // keyed by model id and content, so stale entries cannot be observed.
    async fn embedding_cache_get(&self, key: &str) -> Result<Option<Vec<f32>>, DomainError>;
    async fn embedding_cache_put(&self, key: &str, vector: &[f32]) -> Result<(), DomainError>;

    async fn summary_cache_get(&self, key: &str) -> Result<Option<String>, DomainError>;
    async fn summary_cache_put(&self, key: &str, summary: &str) -> Result<(), DomainError>;

    /// Bounded rewrite cache; eviction is LRU by last use.
    async fn rewrite_cache_get(&self, key: &str) -> Result<Option<String>, DomainError>;
    async fn rewrite_cache_put(&self, key: &str, rewritten: &str) -> Result<(), DomainError>;

    async fn meta_get(&self, key: &str) -> Result<Option<String>, DomainError>;
    async fn meta_set(&self, key: &str, value: &str) -> Result<(), DomainError>;
}
