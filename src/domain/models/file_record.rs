use serde::{Deserialize, Serialize};

use super::Language;

/// Durable per-file state used for incremental change detection.
/// The content hash is the sole authority for "changed"; the timestamp
/// is advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content_hash: String,
    pub language: Language,
    pub size_bytes: u64,
    pub last_indexed_at: i64,
}

impl FileRecord {
    pub fn new(
        path: impl Into<String>,
        content_hash: impl Into<String>,
        language: Language,
        size_bytes: u64,
        last_indexed_at: i64,
    ) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            language,
            size_bytes,
            last_indexed_at,
        }
    }
}

/// Computes the SHA-256 hash of raw file bytes.
pub fn compute_content_hash(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(content);
    format!("{:x}", hash)
}
