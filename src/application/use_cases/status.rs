use std::sync::Arc;

use crate::application::MetadataStore;
use crate::domain::{DomainError, RepoHandle};

/// Snapshot of a repository's index state for `/status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub repo_path: String,
    pub indexed_files: u64,
    pub indexed_chunks: u64,
    pub model: Option<String>,
    pub last_indexed_at: Option<i64>,
}

pub struct StatusUseCase;

impl StatusUseCase {
    pub async fn execute(
        repo: &RepoHandle,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<StatusReport, DomainError> {
        let indexed_files = metadata.file_count().await?;
        let indexed_chunks = metadata.chunk_count().await?;
        let model = metadata.meta_get("embedding_model").await?;
        let last_indexed_at = metadata
            .meta_get("last_indexed_at")
            .await?
            .and_then(|v| v.parse().ok());

        Ok(StatusReport {
            repo_path: repo.path_string(),
            indexed_files,
            indexed_chunks,
            model,
            last_indexed_at,
        })
    }
}
