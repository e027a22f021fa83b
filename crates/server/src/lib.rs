//! HTTP surface of the screening service.
//!
//! Routes: free-text search, batch matching, entity retrieval with nested
//! expansion, catalog and algorithm metadata, health probes, and the
//! token-gated reindex trigger. Every response carries W3C trace-context
//! headers and an `x-trace-id`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
mod server;
pub mod state;

pub use config::Settings;
pub use error::{AppError, AppResult};
pub use server::{build_router, start_server};
pub use state::AppState;
