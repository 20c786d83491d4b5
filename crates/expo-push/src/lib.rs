//! Client for the Expo push notification service.
//!
//! The service works in two phases:
//!
//! 1. `POST /push/send` accepts up to [`PUSH_NOTIFICATION_CHUNK_LIMIT`] messages and
//!    answers with one [`PushTicket`] per message, in the same order.
//! 2. `POST /push/getReceipts` accepts up to [`PUSH_RECEIPT_CHUNK_LIMIT`] ticket ids and
//!    answers with a map of ticket id to [`PushReceipt`]. Receipts only exist once the
//!    upstream provider (APNs/FCM) has processed the message.
//!
//! A ticket with `status = "ok"` only means the service accepted the message; the
//! receipt is the delivery verdict.

pub mod client;
pub mod error;
pub mod token;
pub mod types;

pub use client::{ClientConfig, DEFAULT_BASE_URL, ExpoClient};
pub use error::{Error, Result};
pub use token::is_expo_push_token;
pub use types::{
    PushErrorCode, PushErrorDetails, PushMessage, PushPriority, PushReceipt, PushStatus,
    PushTicket,
};

/// Maximum number of messages per `push/send` request.
pub const PUSH_NOTIFICATION_CHUNK_LIMIT: usize = 100;

/// Maximum number of ticket ids per `push/getReceipts` request.
pub const PUSH_RECEIPT_CHUNK_LIMIT: usize = 300;
