mod chat_client;
mod duckdb_metadata_store;
mod duckdb_vector_store;
mod gemini_client;
mod in_memory_vector_store;
mod llm_collaborator;
mod mock_cross_encoder;
mod mock_embedding;
mod openai_client;
mod ort_cross_encoder;
mod ort_embedding;
mod treesitter_parser;

pub use chat_client::*;
pub use duckdb_metadata_store::*;
pub use duckdb_vector_store::*;
pub use gemini_client::*;
pub use in_memory_vector_store::*;
pub use llm_collaborator::*;
pub use mock_cross_encoder::*;
pub use mock_embedding::*;
pub use openai_client::*;
pub use ort_cross_encoder::*;
pub use ort_embedding::*;
pub use treesitter_parser::*;
