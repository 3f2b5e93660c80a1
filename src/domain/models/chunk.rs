use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::IntentTag;

/// Represents the kind of code construct a chunk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Route,
    Block,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Class => "class",
            ChunkKind::Route => "route",
            ChunkKind::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "function" => ChunkKind::Function,
            "method" => ChunkKind::Method,
            "class" => ChunkKind::Class,
            "route" => ChunkKind::Route,
            _ => ChunkKind::Block,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ChunkKind::Function => "Function",
            ChunkKind::Method => "Method",
            ChunkKind::Class => "Class",
            ChunkKind::Route => "Route",
            ChunkKind::Block => "Block",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The atomic retrieval unit. Doubles as the metadata row and the vector
/// payload; raw source text is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol: String,
    pub kind: ChunkKind,
    pub content_hash: String,
    pub tokens: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub intent_tags: Vec<IntentTag>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo_id: &str,
        path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        symbol: impl Into<String>,
        kind: ChunkKind,
        content_hash: impl Into<String>,
        tokens: u32,
    ) -> Self {
        let path = path.into();
        let symbol = symbol.into();
        let content_hash = content_hash.into();
        let chunk_id = compute_chunk_id(repo_id, &path, start_line, end_line, &symbol, &content_hash);
        let description = describe(kind, &symbol, &path);

        Self {
            chunk_id,
            path,
            start_line,
            end_line,
            symbol,
            kind,
            content_hash,
            tokens,
            description,
            summary: None,
            intent_tags: Vec::new(),
            keywords: Vec::new(),
            http_method: None,
            resource: None,
        }
    }

    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.path, self.start_line, self.end_line)
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Refreshes the human-readable pointer after the kind changed
    /// (e.g. a function reclassified as a route by the enricher).
    pub fn refresh_description(&mut self) {
        self.description = describe(self.kind, &self.symbol, &self.path);
    }

    /// Canonical embedding input. Semantic metadata only; raw source code
    /// must never appear in this block.
    pub fn embedding_text(&self) -> String {
        let mut text = String::with_capacity(256);
        text.push_str(&format!("File: {}\n", self.path));
        let symbol = if self.symbol.is_empty() {
            "(none)"
        } else {
            &self.symbol
        };
        text.push_str(&format!("Symbol: {}\n", symbol));
        text.push_str(&format!("Type: {}\n", self.kind));
        let intents = self
            .intent_tags
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        text.push_str(&format!("Intent: {}\n", intents));
        if let Some(ref method) = self.http_method {
            text.push_str(&format!("HTTP method: {}\n", method));
        }
        if let Some(ref resource) = self.resource {
            text.push_str(&format!("Resource: {}\n", resource));
        }
        let summary = self.summary.as_deref().unwrap_or(&self.description);
        text.push_str(&format!("Summary: {}\n", summary));
        text.push_str(&format!("Keywords: {}", self.keywords.join(" ")));
        text
    }
}

fn describe(kind: ChunkKind, symbol: &str, path: &str) -> String {
    if symbol.is_empty() {
        format!("{} in {}", kind.label(), path)
    } else {
        format!("{} {} in {}", kind.label(), symbol, path)
    }
}

/// Stable digest over the identity of a chunk. Unchanged source with
/// unchanged lines and symbol yields the same id across runs.
pub fn compute_chunk_id(
    repo_id: &str,
    path: &str,
    start_line: u32,
    end_line: u32,
    symbol: &str,
    content_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    hasher.update(start_line.to_le_bytes());
    hasher.update(end_line.to_le_bytes());
    hasher.update(symbol.as_bytes());
    hasher.update(b"\0");
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}
