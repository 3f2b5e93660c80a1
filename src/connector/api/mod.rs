pub mod dto;
pub mod handlers;
pub mod router;
pub mod state;

pub use dto::*;
pub use router::*;
pub use state::*;
