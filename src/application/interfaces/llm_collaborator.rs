use async_trait::async_trait;

use crate::domain::{DomainError, Selection};

/// One candidate handed to the LLM for rerank + selection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RerankCandidate {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol: String,
    pub summary: String,
    pub score: f32,
}

/// The LLM's verdict: a reordering of the candidate indices plus a single
/// selected jump target.
#[derive(Debug, Clone)]
pub struct LlmVerdict {
    pub order: Vec<usize>,
    pub selection: Selection,
}

/// Optional LLM-assisted steps. Every call is bounded by a hard timeout;
/// any error or elapse degrades silently to the pre-LLM result at the call
/// site.
#[async_trait]
pub trait LlmCollaborator: Send + Sync {
    /// Transforms a natural question into a terse technical description
    /// used only for embedding.
    async fn rewrite(&self, query: &str) -> Result<String, DomainError>;

    /// Produces a short natural-language description of a chunk.
    async fn summarize(
        &self,
        description: &str,
        source: &str,
        max_chars: usize,
    ) -> Result<String, DomainError>;

    /// Reorders the candidates and picks one jump target.
    async fn rerank_and_select(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<LlmVerdict, DomainError>;

    fn model_id(&self) -> &str;

    /// Model used for query rewrites; defaults to the main model. Salts the
    /// rewrite cache.
    fn rewrite_model_id(&self) -> &str {
        self.model_id()
    }

    /// Model used for chunk summaries; defaults to the main model. Salts the
    /// summary cache.
    fn summary_model_id(&self) -> &str {
        self.model_id()
    }
}
