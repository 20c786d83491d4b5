//! HTTP surface.
//!
//! The document store's change hooks call in here, and operators can run a
//! reconciliation tick on demand.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
