use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::application::{EmbedRole, EmbeddingService, MetadataStore};
use crate::domain::DomainError;

/// Embedding front-end that memoizes by content hash in the repository's
/// metadata store. The key is salted with the model id and role, so model
/// upgrades invalidate without explicit eviction.
pub struct CachedEmbedder {
    service: Arc<dyn EmbeddingService>,
    store: Arc<dyn MetadataStore>,
}

impl CachedEmbedder {
    pub fn new(service: Arc<dyn EmbeddingService>, store: Arc<dyn MetadataStore>) -> Self {
        Self { service, store }
    }

    pub fn cache_key(model_id: &str, role: EmbedRole, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(role.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>, DomainError> {
        let mut vectors = self.embed_batch(&[text.to_string()], role).await?;
        vectors
            .pop()
            .ok_or_else(|| DomainError::embedding("model returned no vector"))
    }

    /// Looks every text up in the cache first and only sends misses to the
    /// model, preserving input order.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        const BATCH_SIZE: usize = 32;

        let model_id = self.service.model_id();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = Self::cache_key(model_id, role, text);
            match self.store.embedding_cache_get(&key).await? {
                Some(vector) => results[i] = Some(vector),
                None => misses.push(i),
            }
        }

        if !misses.is_empty() {
            debug!(
                "Embedding cache: {} hits, {} misses",
                texts.len() - misses.len(),
                misses.len()
            );
        }

        for batch in misses.chunks(BATCH_SIZE) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.service.embed_batch(&batch_texts, role).await?;
            if vectors.len() != batch.len() {
                return Err(DomainError::embedding(format!(
                    "model returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (&i, vector) in batch.iter().zip(vectors) {
                let key = Self::cache_key(model_id, role, &texts[i]);
                self.store.embedding_cache_put(&key, &vector).await?;
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}
