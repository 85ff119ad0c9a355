//! HTTP search service over the [`hybrid_rag`] retrieval pipeline.

pub mod server;
pub mod telemetry;

pub use server::{AppState, ServerConfig, app_router, run_server};
pub use telemetry::init_tracing;
