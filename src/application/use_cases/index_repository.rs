use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use ignore::WalkBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::application::{
    CachedEmbedder, EmbedRole, EmbeddingService, IndexCommit, LlmCollaborator, MetadataStore,
    ParserService, VectorPoint, VectorStore,
};
use crate::domain::{
    build_chunks, compute_content_hash, enrich_chunk, ChunkDraft, ChunkLimits, DomainError,
    FileRecord, Language, RepoHandle,
};

/// Directory names never descended into, on top of `.gitignore` rules.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    ".venv",
    "target",
    ".xtrc",
];

/// Bytes probed for NUL when deciding whether a file is binary.
const BINARY_PROBE_BYTES: usize = 8 * 1024;

const UPSERT_BATCH_SIZE: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub chunk_limits: ChunkLimits,
    /// Files larger than this are skipped entirely.
    pub max_file_size: u64,
    pub summarize_on_index: bool,
    pub summary_max_chars: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_limits: ChunkLimits::default(),
            max_file_size: 1024 * 1024,
            summarize_on_index: false,
            summary_max_chars: 320,
        }
    }
}

/// Counts reported by one index run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexReport {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_deleted: u64,
    pub chunks_indexed: u64,
    pub duration_ms: u64,
}

pub struct IndexRepositoryUseCase {
    parser: Arc<dyn ParserService>,
    embedding: Arc<dyn EmbeddingService>,
    llm: Option<Arc<dyn LlmCollaborator>>,
    options: IndexOptions,
}

impl IndexRepositoryUseCase {
    pub fn new(
        parser: Arc<dyn ParserService>,
        embedding: Arc<dyn EmbeddingService>,
        options: IndexOptions,
    ) -> Self {
        Self {
            parser,
            embedding,
            llm: None,
            options,
        }
    }

    /// Attach the optional LLM collaborator for index-time summarization.
    pub fn with_llm(mut self, llm: Arc<dyn LlmCollaborator>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub async fn execute(
        &self,
        repo: &RepoHandle,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        rebuild: bool,
    ) -> Result<IndexReport, DomainError> {
        let start_time = Instant::now();
        let collection = repo.collection_name();

        if rebuild {
            info!("Rebuilding index for {}", repo.path_string());
            vectors.drop_collection(&collection).await?;
            metadata.clear_index().await?;
        }

        let dim = self.embedding.dimensions();
        let reset = vectors.ensure_collection(&collection, dim).await?;
        if reset && !rebuild {
            // The collection was recreated for a new embedding dimension;
            // chunk rows refer to points that no longer exist.
            warn!(
                "Collection {} reset for dimension {}; clearing stale metadata",
                collection, dim
            );
            metadata.clear_index().await?;
        }

        let existing: HashMap<String, String> = metadata
            .list_files()
            .await?
            .into_iter()
            .map(|f| (f.path, f.content_hash))
            .collect();

        let (walked, files_scanned) = self.walk(repo).await;

        let deleted: Vec<String> = existing
            .keys()
            .filter(|p| !walked.contains_key(*p))
            .cloned()
            .collect();
        let mut to_index: Vec<String> = walked
            .iter()
            .filter(|(p, f)| existing.get(*p) != Some(&f.content_hash))
            .map(|(p, _)| p.clone())
            .collect();
        to_index.sort();

        info!(
            "Index plan for {}: {} scanned, {} to index, {} deleted, {} unchanged",
            repo.path_string(),
            files_scanned,
            to_index.len(),
            deleted.len(),
            walked.len() - to_index.len()
        );

        // Old chunks of deleted and changed files go away before re-upserting.
        let mut stale_paths: Vec<String> = deleted.clone();
        stale_paths.extend(to_index.iter().cloned());
        let stale_chunk_ids = metadata.chunk_ids_for_files(&stale_paths).await?;
        if !stale_chunk_ids.is_empty() {
            vectors.delete(&collection, &stale_chunk_ids).await?;
        }

        let now = unix_now();
        let mut upsert_files = Vec::new();
        let mut drafts: Vec<ChunkDraft> = Vec::new();

        for path in &to_index {
            let file = &walked[path];
            let mut file_drafts = self.chunk_file(repo, path, &file.text);
            for draft in &mut file_drafts {
                enrich_chunk(draft);
            }
            if self.options.summarize_on_index {
                self.summarize_drafts(&metadata, &mut file_drafts).await;
            }
            debug!("Chunked {} into {} chunks", path, file_drafts.len());
            drafts.extend(file_drafts);
            upsert_files.push(FileRecord::new(
                path.clone(),
                file.content_hash.clone(),
                file.language,
                file.size_bytes,
                now,
            ));
        }

        let points = self.embed_drafts(&metadata, &drafts).await?;
        let upserted_ids: Vec<String> = points.iter().map(|p| p.chunk_id.clone()).collect();
        self.upsert_points(&vectors, &collection, &points).await?;

        let chunks_indexed = drafts.len() as u64;
        let files_indexed = to_index.len() as u64;
        let files_deleted = deleted.len() as u64;

        let commit = IndexCommit {
            upsert_files,
            delete_files: deleted,
            upsert_chunks: drafts.into_iter().map(|d| d.chunk).collect(),
            delete_chunk_ids: stale_chunk_ids,
            last_indexed_at: now,
            embedding_model: self.embedding.model_id().to_string(),
            embedding_dim: dim,
        };

        if let Err(e) = metadata.commit_index_run(commit).await {
            // Roll the vector side back to the committed snapshot.
            warn!("Metadata commit failed, removing {} uncommitted points", upserted_ids.len());
            if let Err(cleanup) = vectors.delete(&collection, &upserted_ids).await {
                warn!("Cleanup of uncommitted points failed: {}", cleanup);
            }
            return Err(e);
        }

        self.delete_orphans(&metadata, &vectors, &collection).await?;

        let report = IndexReport {
            files_scanned,
            files_indexed,
            files_deleted,
            chunks_indexed,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(
            "Indexed {}: {} files, {} chunks in {} ms",
            repo.path_string(),
            report.files_indexed,
            report.chunks_indexed,
            report.duration_ms
        );
        Ok(report)
    }

    /// Enumerates candidate files under the root: built-in excludes,
    /// `.gitignore` chain, binary probe, size cap. Unreadable files are
    /// logged and skipped, never errors.
    async fn walk(&self, repo: &RepoHandle) -> (HashMap<String, WalkedFile>, u64) {
        let root = repo.root();
        let mut files = HashMap::new();
        let mut scanned = 0u64;

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_some_and(|t| t.is_dir()) && EXCLUDED_DIRS.contains(&name.as_ref()))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            scanned += 1;

            let path = entry.path().to_path_buf();
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();

            let language = Language::from_path(&path);
            if !language.is_known() {
                continue;
            }

            if let Ok(meta) = entry.metadata() {
                if meta.len() > self.options.max_file_size {
                    debug!("Skipping oversized file {} ({} bytes)", relative, meta.len());
                    continue;
                }
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Failed to read {}: {}", relative, e);
                    continue;
                }
            };
            if bytes.len() as u64 > self.options.max_file_size || looks_binary(&bytes) {
                continue;
            }

            let content_hash = compute_content_hash(&bytes);
            let size_bytes = bytes.len() as u64;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            files.insert(
                relative,
                WalkedFile {
                    content_hash,
                    language,
                    size_bytes,
                    text,
                },
            );
        }

        (files, scanned)
    }

    fn chunk_file(&self, repo: &RepoHandle, path: &str, content: &str) -> Vec<ChunkDraft> {
        let language = Language::from_path(std::path::Path::new(path));
        let ranges = match self.parser.parse(content, path, language) {
            Ok(r) => r,
            Err(e) => {
                warn!("Parse failed for {}: {}", path, e);
                return Vec::new();
            }
        };
        build_chunks(repo.id(), path, &ranges, self.options.chunk_limits)
    }

    /// Fills in summaries for new or changed chunks, consulting the summary
    /// cache first. All failures degrade silently.
    async fn summarize_drafts(&self, metadata: &Arc<dyn MetadataStore>, drafts: &mut [ChunkDraft]) {
        let Some(ref llm) = self.llm else { return };

        for draft in drafts.iter_mut() {
            let key = summary_cache_key(llm.summary_model_id(), &draft.chunk.content_hash);
            match metadata.summary_cache_get(&key).await {
                Ok(Some(summary)) => {
                    draft.chunk.summary = Some(summary);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Summary cache read failed: {}", e);
                    continue;
                }
            }

            match llm
                .summarize(
                    &draft.chunk.description,
                    &draft.source,
                    self.options.summary_max_chars,
                )
                .await
            {
                Ok(summary) => {
                    if let Err(e) = metadata.summary_cache_put(&key, &summary).await {
                        warn!("Summary cache write failed: {}", e);
                    }
                    draft.chunk.summary = Some(summary);
                }
                Err(e) => {
                    debug!("Summarization skipped for {}: {}", draft.chunk.location(), e);
                }
            }
        }
    }

    async fn embed_drafts(
        &self,
        metadata: &Arc<dyn MetadataStore>,
        drafts: &[ChunkDraft],
    ) -> Result<Vec<VectorPoint>, DomainError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = CachedEmbedder::new(self.embedding.clone(), metadata.clone());
        let texts: Vec<String> = drafts.iter().map(|d| d.chunk.embedding_text()).collect();
        let vectors = embedder.embed_batch(&texts, EmbedRole::Doc).await?;

        Ok(drafts
            .iter()
            .zip(vectors)
            .map(|(draft, vector)| VectorPoint {
                chunk_id: draft.chunk.chunk_id.clone(),
                vector,
                payload: draft.chunk.clone(),
            })
            .collect())
    }

    /// Upserts in batches; each batch is retried once on transient failure.
    async fn upsert_points(
        &self,
        vectors: &Arc<dyn VectorStore>,
        collection: &str,
        points: &[VectorPoint],
    ) -> Result<(), DomainError> {
        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            if let Err(first) = vectors.upsert(collection, batch).await {
                warn!("Vector upsert failed, retrying once: {}", first);
                vectors.upsert(collection, batch).await?;
            }
        }
        Ok(())
    }

    /// Deletes vector points with no metadata chunk of the same id.
    async fn delete_orphans(
        &self,
        metadata: &Arc<dyn MetadataStore>,
        vectors: &Arc<dyn VectorStore>,
        collection: &str,
    ) -> Result<(), DomainError> {
        let known: HashSet<String> = metadata.list_chunk_ids().await?.into_iter().collect();
        let orphans: Vec<String> = vectors
            .list_ids(collection)
            .await?
            .into_iter()
            .filter(|id| !known.contains(id))
            .collect();
        if !orphans.is_empty() {
            debug!("Deleting {} orphaned vector points", orphans.len());
            vectors.delete(collection, &orphans).await?;
        }
        Ok(())
    }
}

struct WalkedFile {
    content_hash: String,
    language: Language,
    size_bytes: u64,
    text: String,
}

/// NUL byte within the probe window means binary.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(BINARY_PROBE_BYTES)
        .any(|&b| b == 0)
}

fn summary_cache_key(model_id: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
