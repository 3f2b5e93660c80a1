//! # Connector Layer
//!
//! External integrations implementing the application ports:
//! - DuckDB metadata and vector stores
//! - Tree-sitter parsing
//! - ONNX Runtime embeddings and cross-encoder (plus deterministic mocks)
//! - LLM providers (Gemini, OpenAI) behind a chat transport
//! - The axum HTTP daemon

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;
