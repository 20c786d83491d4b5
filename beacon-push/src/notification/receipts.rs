//! Delivery receipt reconciliation.
//!
//! Runs on a fixed interval, independent of the trigger path. Each tick reads the
//! pending tickets still inside the TTL window, asks the gateway for their receipts
//! in gateway-sized chunks, and moves answered tickets to `ok` or `error`. Tickets
//! older than the window are never polled again and stay `pending`.

use std::collections::HashMap;
use std::sync::Arc;

use expo_push::PushReceipt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::gateway::PushGateway;
use crate::Result;
use crate::config::PipelineConfig;
use crate::database::models::{DeliveryTicketDbModel, TicketStatus, TicketStatusUpdate};
use crate::database::repositories::{DeviceTokenRepository, TicketRepository};
use crate::database::time::{now_ms, window_start_ms};

/// Counters for one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub polled: usize,
    pub ok: usize,
    pub error: usize,
    /// No receipt yet, or the chunk's poll or commit failed.
    pub still_pending: usize,
    pub tokens_pruned: u64,
    pub failed_chunks: usize,
    pub failed_commits: usize,
}

/// A device registration the gateway reported as permanently invalid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeadToken {
    recipient_uid: String,
    token: String,
}

pub struct ReceiptReconciler {
    tickets: Arc<dyn TicketRepository>,
    devices: Arc<dyn DeviceTokenRepository>,
    gateway: Arc<dyn PushGateway>,
    config: PipelineConfig,
}

impl ReceiptReconciler {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        devices: Arc<dyn DeviceTokenRepository>,
        gateway: Arc<dyn PushGateway>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            tickets,
            devices,
            gateway,
            config: config.normalized(),
        }
    }

    /// Spawn the periodic loop. The first tick runs immediately.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.receipt_poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_secs = self.config.receipt_poll_interval.as_secs(),
                ttl_hours = self.config.ticket_ttl.as_secs() / 3600,
                "Receipt reconciler started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Receipt reconciliation failed");
                        }
                    }
                }
            }

            info!("Receipt reconciler stopped");
        })
    }

    /// One reconciliation tick. Only a failure to list pending tickets is returned;
    /// chunk-level failures are logged and counted.
    pub async fn run_once(&self) -> Result<ReconcileSummary> {
        let cutoff = window_start_ms(now_ms(), self.config.ticket_ttl_ms());
        let pending = self.tickets.list_pending_since(cutoff).await?;

        let mut summary = ReconcileSummary {
            polled: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            debug!("No pending tickets to reconcile");
            return Ok(summary);
        }

        for chunk in pending.chunks(self.config.receipt_batch_size) {
            self.reconcile_chunk(chunk, &mut summary).await;
        }

        info!(
            polled = summary.polled,
            ok = summary.ok,
            error = summary.error,
            pending = summary.still_pending,
            pruned = summary.tokens_pruned,
            failed_chunks = summary.failed_chunks,
            "Receipt reconciliation finished"
        );
        Ok(summary)
    }

    async fn reconcile_chunk(&self, chunk: &[DeliveryTicketDbModel], summary: &mut ReconcileSummary) {
        let ids: Vec<String> = chunk.iter().map(|t| t.ticket_id.clone()).collect();

        let receipts = match self.gateway.get_receipts(&ids).await {
            Ok(receipts) => receipts,
            Err(e) => {
                warn!(tickets = ids.len(), error = %e, "Receipt poll failed, retrying next tick");
                summary.failed_chunks += 1;
                summary.still_pending += chunk.len();
                return;
            }
        };

        let (updates, dead_tokens) = plan_updates(chunk, &receipts);
        let answered = updates.len();
        let ok = updates
            .iter()
            .filter(|u| u.status == TicketStatus::Ok)
            .count();

        match self.tickets.apply_updates(&updates).await {
            Ok(changed) => {
                debug!(answered, changed, "Applied ticket receipts");
                summary.ok += ok;
                summary.error += answered - ok;
                summary.still_pending += chunk.len() - answered;
            }
            Err(e) => {
                error!(tickets = answered, error = %e, "Failed to commit ticket receipts");
                summary.failed_commits += 1;
                summary.still_pending += chunk.len();
            }
        }

        for dead in dead_tokens {
            match self
                .devices
                .delete_token(&dead.recipient_uid, &dead.token)
                .await
            {
                Ok(removed) => {
                    if removed > 0 {
                        info!(
                            recipient_uid = %dead.recipient_uid,
                            removed,
                            "Pruned unregistered device token"
                        );
                    }
                    summary.tokens_pruned += removed;
                }
                Err(e) => warn!(
                    recipient_uid = %dead.recipient_uid,
                    error = %e,
                    "Failed to prune device token"
                ),
            }
        }
    }
}

/// Terminal updates for the tickets that have a receipt, and the tokens to prune.
fn plan_updates(
    chunk: &[DeliveryTicketDbModel],
    receipts: &HashMap<String, PushReceipt>,
) -> (Vec<TicketStatusUpdate>, Vec<DeadToken>) {
    let mut updates = Vec::new();
    let mut dead_tokens: Vec<DeadToken> = Vec::new();

    for ticket in chunk {
        let Some(receipt) = receipts.get(&ticket.ticket_id) else {
            continue;
        };
        if receipt.is_ok() {
            updates.push(TicketStatusUpdate::ok(&ticket.ticket_id));
            continue;
        }

        let code = receipt.error_code();
        updates.push(TicketStatusUpdate::error(
            &ticket.ticket_id,
            code.map(|c| c.as_str().to_string()),
            receipt.message.clone(),
        ));

        if code.is_some_and(|c| c.is_permanent_device_failure()) {
            let dead = DeadToken {
                recipient_uid: ticket.recipient_uid.clone(),
                token: ticket.token.clone(),
            };
            if !dead_tokens.contains(&dead) {
                dead_tokens.push(dead);
            }
        }
    }

    (updates, dead_tokens)
}
