//! End-to-end retrieval scenarios over the bundled demo application.

mod common;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use common::copy_demo_app;
use xtrc::{
    ChunkKind, ChunkLimits, DomainError, DuckdbMetadataStore, DuckdbVectorStore, EmbeddingService,
    IndexOptions, IndexRepositoryUseCase, LlmCollaborator, LlmVerdict, MetadataStore,
    MockEmbedding, QueryCodeUseCase, QueryOptions, RepoHandle, RerankCandidate, Selection,
    SelectionSource, TreeSitterParser, VectorStore,
};

struct Env {
    repo: RepoHandle,
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingService>,
}

async fn indexed_env(dir: &Path) -> Env {
    copy_demo_app(dir);
    let repo = RepoHandle::resolve(&dir.to_string_lossy()).unwrap();
    let metadata: Arc<dyn MetadataStore> =
        Arc::new(DuckdbMetadataStore::open(&repo.metadata_db_path()).unwrap());
    let vectors: Arc<dyn VectorStore> =
        Arc::new(DuckdbVectorStore::open(&repo.vector_db_path()).unwrap());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(MockEmbedding::new());

    IndexRepositoryUseCase::new(
        Arc::new(TreeSitterParser::new()),
        embedding.clone(),
        IndexOptions {
            chunk_limits: ChunkLimits {
                min_tokens: 10,
                max_tokens: 800,
            },
            ..Default::default()
        },
    )
    .execute(&repo, metadata.clone(), vectors.clone(), false)
    .await
    .unwrap();

    Env {
        repo,
        metadata,
        vectors,
        embedding,
    }
}

impl Env {
    fn query_use_case(&self, options: QueryOptions) -> QueryCodeUseCase {
        QueryCodeUseCase::new(self.embedding.clone(), options)
    }

    async fn run(&self, query: &str, top_k: usize) -> xtrc::QueryOutcome {
        self.query_use_case(QueryOptions::default())
            .execute(
                &self.repo,
                self.metadata.clone(),
                self.vectors.clone(),
                query,
                top_k,
            )
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn symbol_match_wins_for_get_user_score() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env.run("get user score", 3).await;
    let top = outcome.results.first().expect("at least one result");

    assert_eq!(top.chunk.path, "src/score.js");
    assert_eq!(top.chunk.symbol, "getUserScore");
    assert_eq!(top.breakdown.symbol, 1.0);
    assert!(top.breakdown.keyword >= 0.66);
}

#[tokio::test]
async fn intent_and_route_match_wins_for_create_query() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env.run("create new user score", 5).await;
    let top = outcome.results.first().expect("at least one result");

    assert_eq!(top.chunk.path, "src/server.js");
    assert_eq!(top.chunk.kind, ChunkKind::Route);
    assert_eq!(top.chunk.http_method.as_deref(), Some("POST"));
    assert_eq!(top.breakdown.structural, 1.0);
    assert!(top
        .matched_intents
        .iter()
        .any(|t| t.as_str() == "create_resource"));
}

#[tokio::test]
async fn results_are_sorted_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env.run("score", 10).await;
    assert!(!outcome.results.is_empty());

    for pair in outcome.results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results must sort by score");
    }
    for result in &outcome.results {
        assert!((0.0..=1.0).contains(&result.score));
        assert!(!result.explanation.is_empty());
        // Components with zero contribution never appear in the
        // explanation.
        if result.breakdown.keyword == 0.0 {
            assert!(!result.explanation.contains("keyword="));
        }
        if result.breakdown.symbol == 0.0 {
            assert!(!result.explanation.contains("symbol="));
        }
    }
}

#[tokio::test]
async fn heuristic_selection_points_at_top_result() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env.run("get user score", 3).await;
    let top = outcome.results.first().unwrap();
    let selection = outcome.selection.expect("selection present");

    assert_eq!(selection.file, top.chunk.path);
    assert_eq!(selection.line, top.chunk.start_line);
    assert_eq!(selection.reason, "highest hybrid score");
    assert_eq!(outcome.selection_source, SelectionSource::Heuristic);
    assert!(!outcome.used_llm);
}

#[tokio::test]
async fn top_k_zero_returns_no_results_and_no_selection() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env.run("score", 0).await;
    assert!(outcome.results.is_empty());
    assert!(outcome.selection.is_none());
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let err = env
        .query_use_case(QueryOptions::default())
        .execute(
            &env.repo,
            env.metadata.clone(),
            env.vectors.clone(),
            "   ",
            5,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn unindexed_repo_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    copy_demo_app(dir.path());
    let repo = RepoHandle::resolve(&dir.path().to_string_lossy()).unwrap();
    let metadata: Arc<dyn MetadataStore> =
        Arc::new(DuckdbMetadataStore::open(&repo.metadata_db_path()).unwrap());
    let vectors: Arc<dyn VectorStore> =
        Arc::new(DuckdbVectorStore::open(&repo.vector_db_path()).unwrap());

    let err = QueryCodeUseCase::new(Arc::new(MockEmbedding::new()), QueryOptions::default())
        .execute(&repo, metadata, vectors, "score", 5)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_INDEXED");
}

#[tokio::test]
async fn cross_encoder_rerank_keeps_results_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env
        .query_use_case(QueryOptions::default())
        .with_cross_encoder(Arc::new(xtrc::MockCrossEncoder::new()))
        .execute(
            &env.repo,
            env.metadata.clone(),
            env.vectors.clone(),
            "user score",
            5,
        )
        .await
        .unwrap();

    assert!(!outcome.results.is_empty());
    for pair in outcome.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for result in &outcome.results {
        assert!((0.0..=1.0).contains(&result.score));
    }
}

/// Scripted collaborator: reverses the candidate order and always selects a
/// fixed location.
struct FakeLlm;

#[async_trait]
impl LlmCollaborator for FakeLlm {
    async fn rewrite(&self, _query: &str) -> Result<String, DomainError> {
        Err(DomainError::llm("not scripted"))
    }

    async fn summarize(
        &self,
        _description: &str,
        _source: &str,
        _max_chars: usize,
    ) -> Result<String, DomainError> {
        Err(DomainError::llm("not scripted"))
    }

    async fn rerank_and_select(
        &self,
        _query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<LlmVerdict, DomainError> {
        Ok(LlmVerdict {
            order: (0..candidates.len()).rev().collect(),
            selection: Selection {
                file: "src/score.js".to_string(),
                line: 3,
                reason: "computes the user score".to_string(),
            },
        })
    }

    fn model_id(&self) -> &str {
        "fake-rerank-model"
    }
}

#[tokio::test]
async fn llm_rerank_is_gated_by_vector_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    // Threshold 0.99: mock-embedding similarities sit far below it, so the
    // LLM path is taken.
    let outcome = env
        .query_use_case(QueryOptions {
            use_llm: true,
            llm_threshold: 0.99,
            ..Default::default()
        })
        .with_llm(Arc::new(FakeLlm))
        .execute(
            &env.repo,
            env.metadata.clone(),
            env.vectors.clone(),
            "score calculation",
            5,
        )
        .await
        .unwrap();

    assert!(outcome.used_llm);
    assert_eq!(outcome.selection_source, SelectionSource::Llm);
    assert_eq!(outcome.llm_model.as_deref(), Some("fake-rerank-model"));
    let selection = outcome.selection.unwrap();
    assert_eq!(selection.file, "src/score.js");
    assert_eq!(selection.line, 3);

    // Threshold 0.0: every vector score clears it, so the LLM is skipped.
    let outcome = env
        .query_use_case(QueryOptions {
            use_llm: true,
            llm_threshold: 0.0,
            ..Default::default()
        })
        .with_llm(Arc::new(FakeLlm))
        .execute(
            &env.repo,
            env.metadata.clone(),
            env.vectors.clone(),
            "score calculation",
            5,
        )
        .await
        .unwrap();

    assert!(!outcome.used_llm);
    assert_eq!(outcome.selection_source, SelectionSource::Heuristic);
    assert!(outcome.llm_model.is_none());
}

#[tokio::test]
async fn failing_llm_degrades_to_heuristic_selection() {
    struct BrokenLlm;

    #[async_trait]
    impl LlmCollaborator for BrokenLlm {
        async fn rewrite(&self, _query: &str) -> Result<String, DomainError> {
            Err(DomainError::llm("down"))
        }
        async fn summarize(
            &self,
            _description: &str,
            _source: &str,
            _max_chars: usize,
        ) -> Result<String, DomainError> {
            Err(DomainError::llm("down"))
        }
        async fn rerank_and_select(
            &self,
            _query: &str,
            _candidates: &[RerankCandidate],
        ) -> Result<LlmVerdict, DomainError> {
            Err(DomainError::llm("down"))
        }
        fn model_id(&self) -> &str {
            "broken"
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let env = indexed_env(dir.path()).await;

    let outcome = env
        .query_use_case(QueryOptions {
            use_llm: true,
            llm_threshold: 0.99,
            rewrite_enabled: true,
            ..Default::default()
        })
        .with_llm(Arc::new(BrokenLlm))
        .execute(
            &env.repo,
            env.metadata.clone(),
            env.vectors.clone(),
            "get user score",
            3,
        )
        .await
        .unwrap();

    assert!(!outcome.used_llm);
    assert_eq!(outcome.selection_source, SelectionSource::Heuristic);
    assert!(outcome.rewritten_query.is_none());
    assert!(!outcome.results.is_empty());
}
