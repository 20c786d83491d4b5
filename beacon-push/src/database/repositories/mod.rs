//! Repository layer for database access.
//!
//! Each table is reached through a `Send + Sync` trait so the pipeline's strategies
//! can be handed any backend.

pub mod device_token;
pub mod preference;
pub mod ticket;
pub mod user;

pub use device_token::*;
pub use preference::*;
pub use ticket::*;
pub use user::*;
