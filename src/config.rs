use std::str::FromStr;

use crate::domain::{ChunkLimits, HeuristicMultipliers};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";

/// Which LLM backend serves rewrite, summarize, and rerank calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
    Disabled,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gemini" => LlmProvider::Gemini,
            "openai" => LlmProvider::OpenAi,
            _ => LlmProvider::Disabled,
        }
    }
}

/// Read-only configuration snapshot captured once at daemon start.
/// Environment changes require a restart.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    /// Deterministic hash-seeded embeddings instead of the ONNX model;
    /// for tests and offline demos.
    pub mock_embedding: bool,
    pub use_llm: bool,
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_threshold: f32,
    pub llm_timeout_ms: u64,
    pub rewrite_enabled: bool,
    pub rewrite_model: Option<String>,
    pub summarize_on_index: bool,
    pub summary_model: Option<String>,
    pub summary_max_chars: usize,
    pub local_reranker_enabled: bool,
    pub local_reranker_model: Option<String>,
    pub local_reranker_top_k: usize,
    pub heuristic_route_boost: f32,
    pub heuristic_intent_boost: f32,
    pub heuristic_noise_penalty: f32,
    pub chunk_min_tokens: u32,
    pub chunk_max_tokens: u32,
    pub max_file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            mock_embedding: false,
            use_llm: false,
            llm_provider: LlmProvider::Disabled,
            llm_api_key: String::new(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_threshold: 0.85,
            llm_timeout_ms: 2000,
            rewrite_enabled: false,
            rewrite_model: None,
            summarize_on_index: false,
            summary_model: None,
            summary_max_chars: 320,
            local_reranker_enabled: false,
            local_reranker_model: None,
            local_reranker_top_k: 10,
            heuristic_route_boost: 1.3,
            heuristic_intent_boost: 1.2,
            heuristic_noise_penalty: 0.7,
            chunk_min_tokens: 200,
            chunk_max_tokens: 800,
            max_file_size: 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_str("XTRC_HOST", &defaults.host),
            port: env_parse("XTRC_PORT", defaults.port),
            embedding_model: env_str("EMBEDDING_MODEL", &defaults.embedding_model),
            mock_embedding: env_bool("XTRC_MOCK_EMBEDDING", defaults.mock_embedding),
            use_llm: env_bool("USE_LLM", defaults.use_llm),
            llm_provider: LlmProvider::parse(&env_str("LLM_PROVIDER", "disabled")),
            llm_api_key: env_str("LLM_API_KEY", ""),
            llm_model: env_str("LLM_MODEL", &defaults.llm_model),
            llm_threshold: env_parse("GEMINI_THRESHOLD", defaults.llm_threshold),
            llm_timeout_ms: env_parse("LLM_TIMEOUT_MS", defaults.llm_timeout_ms),
            rewrite_enabled: env_bool("QUERY_REWRITE_ENABLED", defaults.rewrite_enabled),
            rewrite_model: env_opt("REWRITE_MODEL"),
            summarize_on_index: env_bool("GEMINI_SUMMARIZE_ON_INDEX", defaults.summarize_on_index),
            summary_model: env_opt("SUMMARY_MODEL"),
            summary_max_chars: env_parse("GEMINI_SUMMARY_MAX_CHARS", defaults.summary_max_chars),
            local_reranker_enabled: env_bool(
                "LOCAL_RERANKER_ENABLED",
                defaults.local_reranker_enabled,
            ),
            local_reranker_model: env_opt("LOCAL_RERANKER_MODEL"),
            local_reranker_top_k: env_parse("LOCAL_RERANKER_TOP_K", defaults.local_reranker_top_k),
            heuristic_route_boost: env_parse("HEURISTIC_ROUTE_BOOST", defaults.heuristic_route_boost),
            heuristic_intent_boost: env_parse(
                "HEURISTIC_INTENT_BOOST",
                defaults.heuristic_intent_boost,
            ),
            heuristic_noise_penalty: env_parse(
                "HEURISTIC_NOISE_PENALTY",
                defaults.heuristic_noise_penalty,
            ),
            chunk_min_tokens: env_parse("CHUNK_MIN_TOKENS", defaults.chunk_min_tokens),
            chunk_max_tokens: env_parse("CHUNK_MAX_TOKENS", defaults.chunk_max_tokens),
            max_file_size: env_parse("XTRC_MAX_FILE_SIZE", defaults.max_file_size),
        }
    }

    pub fn chunk_limits(&self) -> ChunkLimits {
        ChunkLimits {
            min_tokens: self.chunk_min_tokens,
            max_tokens: self.chunk_max_tokens,
        }
    }

    pub fn multipliers(&self) -> HeuristicMultipliers {
        HeuristicMultipliers {
            route_boost: self.heuristic_route_boost,
            intent_boost: self.heuristic_intent_boost,
            noise_penalty: self.heuristic_noise_penalty,
        }
    }

    /// Whether any LLM-backed feature needs a provider at startup.
    pub fn wants_llm(&self) -> bool {
        (self.use_llm || self.rewrite_enabled || self.summarize_on_index)
            && self.llm_provider != LlmProvider::Disabled
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 8765);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.llm_threshold, 0.85);
        assert_eq!(config.llm_timeout_ms, 2000);
        assert_eq!(config.local_reranker_top_k, 10);
        assert_eq!(config.chunk_min_tokens, 200);
        assert_eq!(config.chunk_max_tokens, 800);
        assert!(!config.wants_llm());
    }

    #[test]
    fn provider_parsing_is_lenient() {
        assert_eq!(LlmProvider::parse("Gemini"), LlmProvider::Gemini);
        assert_eq!(LlmProvider::parse("OPENAI"), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::parse("nope"), LlmProvider::Disabled);
    }
}
