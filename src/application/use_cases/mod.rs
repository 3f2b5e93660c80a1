mod embed_cache;
mod index_repository;
mod query_code;
mod status;

pub use embed_cache::*;
pub use index_repository::*;
pub use query_code::*;
pub use status::*;
