mod cross_encoder;
mod embedding_service;
mod llm_collaborator;
mod metadata_store;
mod parser_service;
mod vector_store;

pub use cross_encoder::*;
pub use embedding_service::*;
pub use llm_collaborator::*;
pub use metadata_store::*;
pub use parser_service::*;
pub use vector_store::*;
