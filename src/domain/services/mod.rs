pub mod chunking;
pub mod enrichment;
pub mod scoring;

pub use chunking::*;
pub use enrichment::*;
pub use scoring::*;
