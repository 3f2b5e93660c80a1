use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::application::{IndexReport, QueryOutcome};
use crate::domain::{DomainError, ScoredChunk, Selection, SelectionSource};

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub repo_path: String,
    #[serde(default)]
    pub rebuild: bool,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub repo_path: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub repo_path: String,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    pub repo_path: String,
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_deleted: u64,
    pub chunks_indexed: u64,
    pub duration_ms: u64,
}

impl IndexResponse {
    pub fn from_report(repo_path: String, report: IndexReport) -> Self {
        Self {
            status: "ok",
            repo_path,
            files_scanned: report.files_scanned,
            files_indexed: report.files_indexed,
            files_deleted: report.files_deleted,
            chunks_indexed: report.chunks_indexed,
            duration_ms: report.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResultDto {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol: String,
    pub description: String,
    pub score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub symbol_score: f32,
    pub intent_score: f32,
    pub structural_score: f32,
    pub matched_intents: Vec<String>,
    pub matched_keywords: Vec<String>,
    pub explanation: String,
}

impl From<&ScoredChunk> for QueryResultDto {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            file_path: scored.chunk.path.clone(),
            start_line: scored.chunk.start_line,
            end_line: scored.chunk.end_line,
            symbol: scored.chunk.symbol.clone(),
            description: scored.chunk.description.clone(),
            score: scored.score,
            vector_score: scored.breakdown.vector,
            keyword_score: scored.breakdown.keyword,
            symbol_score: scored.breakdown.symbol,
            intent_score: scored.breakdown.intent,
            structural_score: scored.breakdown.structural,
            matched_intents: scored
                .matched_intents
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            matched_keywords: scored.matched_keywords.clone(),
            explanation: scored.explanation.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub status: &'static str,
    pub repo_path: String,
    pub query: String,
    pub results: Vec<QueryResultDto>,
    pub duration_ms: u64,
    pub selection: Option<Selection>,
    pub selection_source: &'static str,
    pub used_llm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
}

impl QueryResponse {
    pub fn from_outcome(repo_path: String, query: String, outcome: QueryOutcome) -> Self {
        Self {
            status: "ok",
            repo_path,
            query,
            results: outcome.results.iter().map(QueryResultDto::from).collect(),
            duration_ms: outcome.duration_ms,
            selection: outcome.selection,
            selection_source: match outcome.selection_source {
                SelectionSource::Llm => "llm",
                SelectionSource::Heuristic => "heuristic",
            },
            used_llm: outcome.used_llm,
            llm_model: outcome.llm_model,
            llm_latency_ms: outcome.llm_latency_ms,
            rewritten_query: outcome.rewritten_query,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub repo_path: String,
    pub indexed_files: u64,
    pub indexed_chunks: u64,
    pub model: Option<String>,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub last_indexed_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub error: ErrorBody,
}

/// Wraps a `DomainError` for axum so handlers can use `?`.
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = match &self.0 {
            DomainError::InvalidRepo(_) | DomainError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DomainError::NotIndexed(_) => StatusCode::NOT_FOUND,
            DomainError::Busy(_) | DomainError::DimensionMismatch(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Fatal errors carry a sanitized message; user errors keep theirs.
        let message = if self.0.is_user_error() || matches!(self.0, DomainError::DimensionMismatch(_))
        {
            self.0.to_string()
        } else {
            tracing::error!("Request failed: {}", self.0);
            "internal error".to_string()
        };

        let envelope = ErrorEnvelope {
            status: "error",
            error: ErrorBody {
                code,
                message,
                details: None,
            },
        };
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_http_status() {
        let cases = [
            (DomainError::invalid_repo("x"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_request("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_indexed("x"), StatusCode::NOT_FOUND),
            (DomainError::busy("x"), StatusCode::CONFLICT),
            (DomainError::dimension_mismatch("x"), StatusCode::CONFLICT),
            (DomainError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn query_request_defaults_top_k() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"repo_path": "/tmp/x", "query": "score"}"#).unwrap();
        assert_eq!(request.top_k, 10);
    }
}
