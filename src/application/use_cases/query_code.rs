use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::application::{
    CachedEmbedder, CrossEncoder, EmbedRole, EmbeddingService, LlmCollaborator, MetadataStore,
    RerankCandidate, VectorStore,
};
use crate::domain::{
    derive_query_features, rank, score_candidate, DomainError, HeuristicMultipliers, RepoHandle,
    ScoredChunk, Selection, SelectionSource,
};

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub use_llm: bool,
    /// The LLM rerank is skipped when the best vector score reaches this.
    pub llm_threshold: f32,
    pub rewrite_enabled: bool,
    pub local_reranker_top_k: usize,
    pub multipliers: HeuristicMultipliers,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_llm: false,
            llm_threshold: 0.85,
            rewrite_enabled: false,
            local_reranker_top_k: 10,
            multipliers: HeuristicMultipliers::default(),
        }
    }
}

/// Everything a `/query` response needs.
#[derive(Debug)]
pub struct QueryOutcome {
    pub results: Vec<ScoredChunk>,
    pub selection: Option<Selection>,
    pub selection_source: SelectionSource,
    pub used_llm: bool,
    pub llm_model: Option<String>,
    pub llm_latency_ms: Option<u64>,
    pub rewritten_query: Option<String>,
    pub duration_ms: u64,
}

pub struct QueryCodeUseCase {
    embedding: Arc<dyn EmbeddingService>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    llm: Option<Arc<dyn LlmCollaborator>>,
    options: QueryOptions,
}

impl QueryCodeUseCase {
    pub fn new(embedding: Arc<dyn EmbeddingService>, options: QueryOptions) -> Self {
        Self {
            embedding,
            cross_encoder: None,
            llm: None,
            options,
        }
    }

    pub fn with_cross_encoder(mut self, cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(cross_encoder);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmCollaborator>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub async fn execute(
        &self,
        repo: &RepoHandle,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        query: &str,
        top_k: usize,
    ) -> Result<QueryOutcome, DomainError> {
        let start_time = Instant::now();

        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::invalid_request("query must not be empty"));
        }

        self.check_indexed(repo, &metadata).await?;

        let rewritten = self.rewrite_query(&metadata, query).await;
        let embed_input = rewritten.as_deref().unwrap_or(query);

        // Keywords and intents always come from the user's own words.
        let features = derive_query_features(query);

        let embedder = CachedEmbedder::new(self.embedding.clone(), metadata.clone());
        let query_vector = embedder.embed(embed_input, EmbedRole::Query).await?;

        let fetch_k = (top_k * 4).max(25);
        let hits = vectors
            .search(&repo.collection_name(), &query_vector, fetch_k)
            .await?;
        debug!("ANN search returned {} candidates", hits.len());

        let mut candidates: Vec<ScoredChunk> = hits
            .iter()
            .map(|hit| {
                score_candidate(&features, &hit.payload, hit.similarity, &self.options.multipliers)
            })
            .collect();
        rank(&mut candidates);
        candidates.truncate(top_k * 2);

        self.apply_cross_encoder(query, &mut candidates).await;

        let best_vector = candidates
            .iter()
            .map(|c| c.breakdown.vector)
            .fold(0.0f32, f32::max);

        let mut used_llm = false;
        let mut llm_latency_ms = None;
        let mut selection = None;
        let mut selection_source = SelectionSource::Heuristic;

        if self.options.use_llm && best_vector < self.options.llm_threshold {
            if let Some(verdict) = self.llm_rerank(query, &mut candidates, &mut llm_latency_ms).await
            {
                selection = Some(verdict);
                selection_source = SelectionSource::Llm;
                used_llm = true;
            }
        }

        candidates.truncate(top_k);

        if selection.is_none() {
            selection = candidates.first().map(|top| Selection {
                file: top.chunk.path.clone(),
                line: top.chunk.start_line,
                reason: "highest hybrid score".to_string(),
            });
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Query \"{}\" on {}: {} results in {} ms (llm: {})",
            query,
            repo.path_string(),
            candidates.len(),
            duration_ms,
            used_llm
        );

        Ok(QueryOutcome {
            results: candidates,
            selection,
            selection_source,
            used_llm,
            llm_model: used_llm
                .then(|| self.llm.as_ref().map(|l| l.model_id().to_string()))
                .flatten(),
            llm_latency_ms,
            rewritten_query: rewritten,
            duration_ms,
        })
    }

    /// `NOT_INDEXED` when no index exists; `INDEX_DIMENSION_MISMATCH` when
    /// the index was built by a model with a different dimension.
    async fn check_indexed(
        &self,
        repo: &RepoHandle,
        metadata: &Arc<dyn MetadataStore>,
    ) -> Result<(), DomainError> {
        let indexed = metadata.meta_get("last_indexed_at").await?.is_some();
        if !indexed {
            return Err(DomainError::not_indexed(repo.path_string()));
        }

        if let Some(stored) = metadata.meta_get("embedding_dim").await? {
            let stored_dim: usize = stored.parse().unwrap_or(0);
            if stored_dim != self.embedding.dimensions() {
                return Err(DomainError::dimension_mismatch(format!(
                    "index dimension {} does not match model dimension {}; re-index with rebuild",
                    stored_dim,
                    self.embedding.dimensions()
                )));
            }
        }
        Ok(())
    }

    /// Rewrite via cache, then LLM. Any failure falls back to the raw query.
    async fn rewrite_query(
        &self,
        metadata: &Arc<dyn MetadataStore>,
        query: &str,
    ) -> Option<String> {
        if !self.options.rewrite_enabled {
            return None;
        }
        let llm = self.llm.as_ref()?;

        let key = rewrite_cache_key(llm.rewrite_model_id(), query);
        match metadata.rewrite_cache_get(&key).await {
            Ok(Some(cached)) => return Some(cached),
            Ok(None) => {}
            Err(e) => warn!("Rewrite cache read failed: {}", e),
        }

        match llm.rewrite(query).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                if let Err(e) = metadata.rewrite_cache_put(&key, &rewritten).await {
                    warn!("Rewrite cache write failed: {}", e);
                }
                Some(rewritten)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Query rewrite skipped: {}", e);
                None
            }
        }
    }

    /// Blends cross-encoder scores into the top candidates:
    /// `0.6 · rank_norm(ce) + 0.4 · score`. Failures leave the input order.
    async fn apply_cross_encoder(&self, query: &str, candidates: &mut Vec<ScoredChunk>) {
        let Some(ref cross_encoder) = self.cross_encoder else {
            return;
        };
        if candidates.len() < 2 {
            return;
        }

        let take = self.options.local_reranker_top_k.min(candidates.len());
        let documents: Vec<String> = candidates[..take]
            .iter()
            .map(|c| c.chunk.embedding_text())
            .collect();

        let raw = match cross_encoder.score(query, &documents).await {
            Ok(scores) if scores.len() == take => scores,
            Ok(scores) => {
                warn!(
                    "Cross-encoder returned {} scores for {} documents; skipping",
                    scores.len(),
                    take
                );
                return;
            }
            Err(e) => {
                warn!("Cross-encoder failed: {}", e);
                return;
            }
        };

        let min = raw.iter().copied().fold(f32::INFINITY, f32::min);
        let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let span = (max - min).max(f32::EPSILON);

        for (candidate, ce) in candidates[..take].iter_mut().zip(&raw) {
            let rank_norm = (ce - min) / span;
            candidate.score = (0.6 * rank_norm + 0.4 * candidate.score).clamp(0.0, 1.0);
        }
        // Keep the whole list ordered by score so responses stay sorted.
        rank(candidates);
    }

    /// LLM rerank + selection over the top candidates. Returns the selection
    /// on success after applying the model's ordering.
    async fn llm_rerank(
        &self,
        query: &str,
        candidates: &mut Vec<ScoredChunk>,
        latency_out: &mut Option<u64>,
    ) -> Option<Selection> {
        let llm = self.llm.as_ref()?;
        if candidates.is_empty() {
            return None;
        }

        let take = candidates.len().min(10);
        let payload: Vec<RerankCandidate> = candidates[..take]
            .iter()
            .map(|c| RerankCandidate {
                path: c.chunk.path.clone(),
                start_line: c.chunk.start_line,
                end_line: c.chunk.end_line,
                symbol: c.chunk.symbol.clone(),
                summary: c
                    .chunk
                    .summary
                    .clone()
                    .unwrap_or_else(|| c.chunk.description.clone()),
                score: c.score,
            })
            .collect();

        let started = Instant::now();
        let verdict = match llm.rerank_and_select(query, &payload).await {
            Ok(v) => v,
            Err(e) => {
                debug!("LLM rerank skipped: {}", e);
                return None;
            }
        };
        *latency_out = Some(started.elapsed().as_millis() as u64);

        // Apply the model's ordering to the head; unknown or duplicate
        // indices are ignored, unmentioned candidates keep their order.
        let mut head: Vec<Option<ScoredChunk>> =
            candidates.drain(..take).map(Some).collect();
        let mut reordered = Vec::with_capacity(take);
        for idx in verdict.order {
            if let Some(slot) = head.get_mut(idx) {
                if let Some(candidate) = slot.take() {
                    reordered.push(candidate);
                }
            }
        }
        reordered.extend(head.into_iter().flatten());
        reordered.append(candidates);
        *candidates = reordered;

        Some(verdict.selection)
    }
}

fn rewrite_cache_key(model_id: &str, raw_query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(raw_query.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_key_salts_with_model() {
        let a = rewrite_cache_key("m1", "where is auth");
        let b = rewrite_cache_key("m2", "where is auth");
        assert_ne!(a, b);
        assert_eq!(a, rewrite_cache_key("m1", "where is auth"));
    }
}
