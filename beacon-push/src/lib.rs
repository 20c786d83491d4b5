//! beacon-push library crate.
//!
//! Push notification fan-out for beacon activations and delivery receipt
//! reconciliation. Exposed as a library for the binary and integration tests.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;
pub mod services;

pub use error::{Error, Result};
