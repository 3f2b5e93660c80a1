use async_trait::async_trait;

use crate::domain::DomainError;

/// Whether a text is embedded as an indexed document or as a search query.
/// Models with asymmetric retrieval instructions (e.g. BGE) prepend their
/// query instruction for `Query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedRole {
    Doc,
    Query,
}

impl EmbedRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedRole::Doc => "doc",
            EmbedRole::Query => "query",
        }
    }
}

/// Maps text to a fixed-dimension, L2-normalized vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_batch(
        &self,
        texts: &[String],
        role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, DomainError>;

    async fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>, DomainError> {
        let vectors = self.embed_batch(&[text.to_string()], role).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("model returned no vector"))
    }

    /// Model identifier including version; salts cache keys so upgrades
    /// invalidate without explicit eviction.
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;
}
