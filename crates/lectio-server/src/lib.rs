//! HTTP service wiring for the lectio pipeline.

pub mod analyzer_client;
pub mod handlers;
pub mod rate_limit;

pub use analyzer_client::CommandAnalyzer;
pub use handlers::{AppState, router};
