use serde::{Deserialize, Serialize};

use super::{Chunk, IntentTag};

/// Component scores for one candidate, all normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub vector: f32,
    pub keyword: f32,
    pub symbol: f32,
    pub intent: f32,
    pub structural: f32,
    /// Multiplicative heuristics applied after the weighted sum, in the
    /// order route boost, intent boost, noise penalty. `1.0` means inactive.
    pub route_boost: f32,
    pub intent_boost: f32,
    pub noise_penalty: f32,
}

/// A candidate chunk with its hybrid score and the evidence behind it.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
    pub matched_intents: Vec<IntentTag>,
    pub matched_keywords: Vec<String>,
    pub explanation: String,
}

impl ScoredChunk {
    pub fn location(&self) -> String {
        self.chunk.location()
    }
}

/// The single jump target surfaced as the system's top recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub file: String,
    pub line: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Heuristic,
    Llm,
}

impl SelectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionSource::Heuristic => "heuristic",
            SelectionSource::Llm => "llm",
        }
    }
}
