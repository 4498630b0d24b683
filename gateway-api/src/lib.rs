//! Tool-surface binary: exposes the nine named operations (spec §6) over a
//! small axum router, backed by the fan-out engine and provider adapters.

mod auth;
mod error;
mod routes;
mod state;
mod tools;

pub use error::{ApiError, ErrorCode, ToolError};
pub use routes::build_router;
pub use state::AppState;
