use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::application::{
    CrossEncoder, EmbeddingService, IndexOptions, LlmCollaborator, MetadataStore, ParserService,
    QueryOptions, VectorStore,
};
use crate::config::{Config, LlmProvider};
use crate::connector::adapter::{
    ChatClient, ChatCollaborator, DuckdbMetadataStore, DuckdbVectorStore, GeminiClient,
    MockEmbedding, OpenAiClient, OrtCrossEncoder, OrtEmbedding, TreeSitterParser,
};
use crate::domain::{DomainError, RepoHandle};

/// Per-repository daemon state: the readers-writer lock and the open store
/// handles. One writer (`/index`) or many readers (`/query`, `/status`) at
/// a time; the stores themselves serialize raw DB access internally.
pub struct RepoState {
    pub lock: Arc<RwLock<()>>,
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorStore>,
}

/// Shared daemon state: the read-only config snapshot, lazily loaded model
/// services, and the repository registry.
pub struct AppState {
    pub config: Arc<Config>,
    pub parser: Arc<dyn ParserService>,
    pub embedding: Arc<dyn EmbeddingService>,
    pub cross_encoder: Option<Arc<dyn CrossEncoder>>,
    pub llm: Option<Arc<dyn LlmCollaborator>>,
    repos: Mutex<HashMap<String, Arc<RepoState>>>,
}

impl AppState {
    pub fn build(config: Config) -> Result<Arc<Self>, DomainError> {
        let parser: Arc<dyn ParserService> = Arc::new(TreeSitterParser::new());

        let embedding: Arc<dyn EmbeddingService> = if config.mock_embedding {
            info!("Using mock embedding service");
            Arc::new(MockEmbedding::new())
        } else {
            Arc::new(OrtEmbedding::new(Some(&config.embedding_model))?)
        };

        let cross_encoder: Option<Arc<dyn CrossEncoder>> = if config.local_reranker_enabled {
            match OrtCrossEncoder::new(config.local_reranker_model.as_deref()) {
                Ok(encoder) => Some(Arc::new(encoder)),
                Err(e) => {
                    warn!("Cross-encoder unavailable, continuing without: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let llm = Self::build_llm(&config);

        Ok(Arc::new(Self {
            config: Arc::new(config),
            parser,
            embedding,
            cross_encoder,
            llm,
            repos: Mutex::new(HashMap::new()),
        }))
    }

    /// Test constructor with injected services.
    pub fn with_services(
        config: Config,
        parser: Arc<dyn ParserService>,
        embedding: Arc<dyn EmbeddingService>,
        cross_encoder: Option<Arc<dyn CrossEncoder>>,
        llm: Option<Arc<dyn LlmCollaborator>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            parser,
            embedding,
            cross_encoder,
            llm,
            repos: Mutex::new(HashMap::new()),
        })
    }

    fn build_llm(config: &Config) -> Option<Arc<dyn LlmCollaborator>> {
        if !config.wants_llm() {
            return None;
        }
        let client: Arc<dyn ChatClient> = match config.llm_provider {
            LlmProvider::Gemini => Arc::new(GeminiClient::new(config.llm_api_key.clone())),
            LlmProvider::OpenAi => Arc::new(OpenAiClient::new(config.llm_api_key.clone())),
            LlmProvider::Disabled => return None,
        };

        let mut collaborator = ChatCollaborator::new(
            client,
            config.llm_model.clone(),
            Duration::from_millis(config.llm_timeout_ms),
        );
        if let Some(ref model) = config.rewrite_model {
            collaborator = collaborator.with_rewrite_model(model.clone());
        }
        if let Some(ref model) = config.summary_model {
            collaborator = collaborator.with_summary_model(model.clone());
        }
        Some(Arc::new(collaborator))
    }

    /// Returns the repository's state, opening its stores on first use.
    /// Store handles are shared so that every request for a repository
    /// speaks to the same DuckDB connections.
    pub async fn repo_state(&self, repo: &RepoHandle) -> Result<Arc<RepoState>, DomainError> {
        let mut repos = self.repos.lock().await;
        if let Some(state) = repos.get(repo.id()) {
            return Ok(state.clone());
        }

        let metadata: Arc<dyn MetadataStore> =
            Arc::new(DuckdbMetadataStore::open(&repo.metadata_db_path())?);
        let vectors: Arc<dyn VectorStore> =
            Arc::new(DuckdbVectorStore::open(&repo.vector_db_path())?);

        let state = Arc::new(RepoState {
            lock: Arc::new(RwLock::new(())),
            metadata,
            vectors,
        });
        repos.insert(repo.id().to_string(), state.clone());
        Ok(state)
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            chunk_limits: self.config.chunk_limits(),
            max_file_size: self.config.max_file_size,
            summarize_on_index: self.config.summarize_on_index && self.llm.is_some(),
            summary_max_chars: self.config.summary_max_chars,
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            use_llm: self.config.use_llm && self.llm.is_some(),
            llm_threshold: self.config.llm_threshold,
            rewrite_enabled: self.config.rewrite_enabled && self.llm.is_some(),
            local_reranker_top_k: self.config.local_reranker_top_k,
            multipliers: self.config.multipliers(),
        }
    }
}
