//! Push gateway seam.

use std::collections::HashMap;

use async_trait::async_trait;
use expo_push::{ExpoClient, PushMessage, PushReceipt, PushTicket};

use crate::Result;

/// Outbound calls the pipeline makes to the push gateway.
///
/// `send_batch` must return exactly one ticket per message, in message order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>>;

    /// Receipts keyed by ticket id. Ids the gateway has no verdict for yet are absent.
    async fn get_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, PushReceipt>>;
}

#[async_trait]
impl PushGateway for ExpoClient {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>> {
        Ok(self.send_push_notifications(messages).await?)
    }

    async fn get_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, PushReceipt>> {
        Ok(self.get_push_notification_receipts(ticket_ids).await?)
    }
}
