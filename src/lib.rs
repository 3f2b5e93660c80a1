//! # xtrc
//!
//! A local, editor-agnostic code navigation daemon. Natural-language
//! questions about a repository come back as ranked jump targets, backed by
//! a persistent per-repository index that combines tree-sitter parsing,
//! dense embeddings, and a hybrid scorer, with optional LLM-assisted
//! reranking.
//!
//! ## Architecture
//!
//! - `domain`: models and pure services (chunking, enrichment, scoring)
//! - `application`: port traits and orchestration use cases
//! - `connector`: DuckDB stores, tree-sitter, ONNX models, LLM providers,
//!   and the axum daemon

pub mod application;
pub mod config;
pub mod connector;
pub mod domain;

// Re-export commonly used types
pub use application::*;
pub use config::*;
pub use connector::*;
pub use domain::*;
