//! Database models.

pub mod device_token;
pub mod preference;
pub mod ticket;
pub mod user;

pub use device_token::*;
pub use preference::*;
pub use ticket::*;
pub use user::*;
