use async_trait::async_trait;

use crate::domain::DomainError;

/// Pairwise relevance model scoring `(query, document)` pairs. Higher is
/// more relevant; outputs are min-max normalized by the caller.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, DomainError>;

    fn model_name(&self) -> &str;
}
