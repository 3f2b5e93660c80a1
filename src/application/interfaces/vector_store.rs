use async_trait::async_trait;

use crate::domain::{Chunk, DomainError};

/// A point to upsert: unit-norm embedding plus the payload mirror of the
/// chunk fields needed for scoring.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub payload: Chunk,
}

/// A search hit in descending cosine-similarity order.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub chunk_id: String,
    pub similarity: f32,
    pub payload: Chunk,
}

/// ANN index over unit-normalized embeddings, one collection per repository.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection if missing. An existing collection with a
    /// different dimension is dropped and recreated; returns `true` when
    /// that reset happened.
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<bool, DomainError>;

    async fn collection_dim(&self, name: &str) -> Result<Option<usize>, DomainError>;

    async fn drop_collection(&self, name: &str) -> Result<(), DomainError>;

    /// Idempotent on `chunk_id`; the latest write wins.
    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<(), DomainError>;

    async fn delete(&self, name: &str, chunk_ids: &[String]) -> Result<(), DomainError>;

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPoint>, DomainError>;

    /// All point ids in the collection; used for orphan cleanup at the end
    /// of an index run.
    async fn list_ids(&self, name: &str) -> Result<Vec<String>, DomainError>;

    async fn count(&self, name: &str) -> Result<u64, DomainError>;
}
