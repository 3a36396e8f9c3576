//! keygate-core: Shared infrastructure for the keygate auth backend.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use tracing;
pub use validator;
