//! Thin, optional adapters over `DependencyHealth` for a host's web framework.
//! The core never depends on these; they exist purely as convenience wiring.

pub mod axum;

pub use axum::{dependencies_router, metrics_handler};
