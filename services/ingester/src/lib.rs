//! Atmos ingester service.
//!
//! Thin HTTP layer over [`ingestion::Ingester`]: triggers, frame and legend
//! lookups, health and metrics.

pub mod server;

pub use server::{build_router, start_server, ServerState};
