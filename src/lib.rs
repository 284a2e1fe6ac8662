// Module declarations
pub mod config;
pub mod events;
pub mod evidence;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod shutdown;
pub mod storage;
pub mod utils;

// Server module (HTTP/SSE API)
pub mod server;

// Re-export models for use across the crate and in integration tests
pub use models::*;
