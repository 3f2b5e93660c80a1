use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use tracing::debug;

use crate::application::{
    IndexRepositoryUseCase, QueryCodeUseCase, StatusUseCase,
};
use crate::domain::{DomainError, RepoHandle};

use super::dto::{
    ApiError, IndexRequest, IndexResponse, QueryRequest, QueryResponse, StatusParams,
    StatusResponse,
};
use super::state::AppState;

/// `POST /index` — write-locks the repository for the whole run; a second
/// concurrent index on the same repository fails fast with `BUSY`.
pub async fn post_index(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let repo = RepoHandle::resolve(&request.repo_path)?;
    let repo_state = state.repo_state(&repo).await?;

    let _guard = repo_state
        .lock
        .clone()
        .try_write_owned()
        .map_err(|_| DomainError::busy(format!("{} is being indexed", repo.path_string())))?;

    let mut use_case = IndexRepositoryUseCase::new(
        state.parser.clone(),
        state.embedding.clone(),
        state.index_options(),
    );
    if let Some(ref llm) = state.llm {
        use_case = use_case.with_llm(llm.clone());
    }

    let metadata = repo_state.metadata.clone();
    let vectors = repo_state.vectors.clone();
    let rebuild = request.rebuild;

    // The core pipeline runs in its own task so a client disconnect cannot
    // abort it mid-write.
    let report = tokio::spawn(async move {
        let report = use_case.execute(&repo, metadata, vectors, rebuild).await;
        drop(_guard);
        (repo, report)
    })
    .await
    .map_err(|e| DomainError::internal(format!("index task panicked: {e}")))?;

    let (repo, report) = report;
    Ok(Json(IndexResponse::from_report(repo.path_string(), report?)))
}

/// `POST /query` — read-locks the repository; any number of concurrent
/// queries may proceed.
pub async fn post_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let repo = RepoHandle::resolve(&request.repo_path)?;
    let repo_state = state.repo_state(&repo).await?;

    let _guard = repo_state.lock.clone().read_owned().await;

    let mut use_case = QueryCodeUseCase::new(state.embedding.clone(), state.query_options());
    if let Some(ref cross_encoder) = state.cross_encoder {
        use_case = use_case.with_cross_encoder(cross_encoder.clone());
    }
    if let Some(ref llm) = state.llm {
        use_case = use_case.with_llm(llm.clone());
    }

    let metadata = repo_state.metadata.clone();
    let vectors = repo_state.vectors.clone();
    let query = request.query.clone();
    let top_k = request.top_k;

    let outcome = tokio::spawn(async move {
        let outcome = use_case.execute(&repo, metadata, vectors, &query, top_k).await;
        drop(_guard);
        (repo, outcome)
    })
    .await
    .map_err(|e| DomainError::internal(format!("query task panicked: {e}")))?;

    let (repo, outcome) = outcome;
    Ok(Json(QueryResponse::from_outcome(
        repo.path_string(),
        request.query,
        outcome?,
    )))
}

/// `GET /status?repo_path=…` — non-blocking: when an index run holds the
/// write lock, reports `healthy=false` instead of waiting.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusResponse>, ApiError> {
    let repo = RepoHandle::resolve(&params.repo_path)?;
    let repo_state = state.repo_state(&repo).await?;

    let Ok(_guard) = repo_state.lock.try_read() else {
        debug!("Status for {} while indexing", repo.path_string());
        return Ok(Json(StatusResponse {
            status: "ok",
            repo_path: repo.path_string(),
            indexed_files: 0,
            indexed_chunks: 0,
            model: None,
            healthy: false,
            reason: Some("indexing"),
            last_indexed_at: None,
        }));
    };

    let report = StatusUseCase::execute(&repo, repo_state.metadata.clone()).await?;
    Ok(Json(StatusResponse {
        status: "ok",
        repo_path: report.repo_path,
        indexed_files: report.indexed_files,
        indexed_chunks: report.indexed_chunks,
        model: report.model,
        healthy: true,
        reason: None,
        last_indexed_at: report.last_indexed_at,
    }))
}
