//! Beacon fan-out.
//!
//! Each candidate is checked for eligibility, its tokens are resolved, and one
//! message per token is sent through the [`PushGateway`] in gateway-sized batches.
//! Tickets come back index-aligned with the batch; every ticket carrying an id is
//! persisted as `pending` before the batch counts as done. Failures are scoped to
//! the recipient or batch they hit and never abort the rest of the fan-out.

use std::ops::AddAssign;
use std::sync::Arc;

use expo_push::{PushMessage, PushTicket};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::composer::{ComposedContent, beacon_message};
use super::eligibility::{Eligibility, EligibilityResolver};
use super::gateway::PushGateway;
use super::tokens::TokenResolver;
use crate::config::PipelineConfig;
use crate::database::models::DeliveryTicketDbModel;
use crate::database::repositories::TicketRepository;

/// Counters for one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    /// Deduplicated audience size, owner excluded.
    pub candidates: usize,
    pub eligible: usize,
    /// Eligible recipients with no usable token.
    pub without_tokens: usize,
    /// Recipients dropped because a preference or token read failed.
    pub skipped_read_failure: usize,
    /// Messages in batches the gateway answered.
    pub messages_sent: usize,
    pub tickets_persisted: usize,
    /// Tickets the gateway rejected immediately (no id to reconcile).
    pub rejected_tickets: usize,
    pub failed_batches: usize,
    pub failed_persists: usize,
}

impl AddAssign for FanoutReport {
    fn add_assign(&mut self, other: Self) {
        self.candidates += other.candidates;
        self.eligible += other.eligible;
        self.without_tokens += other.without_tokens;
        self.skipped_read_failure += other.skipped_read_failure;
        self.messages_sent += other.messages_sent;
        self.tickets_persisted += other.tickets_persisted;
        self.rejected_tickets += other.rejected_tickets;
        self.failed_batches += other.failed_batches;
        self.failed_persists += other.failed_persists;
    }
}

/// Identifies the beacon a fan-out belongs to.
#[derive(Debug, Clone, Copy)]
struct FanoutContext<'a> {
    beacon_id: &'a str,
    owner_uid: &'a str,
    content: &'a ComposedContent,
}

pub struct FanoutSender {
    eligibility: Arc<EligibilityResolver>,
    tokens: Arc<TokenResolver>,
    gateway: Arc<dyn PushGateway>,
    tickets: Arc<dyn TicketRepository>,
    config: PipelineConfig,
}

impl FanoutSender {
    pub fn new(
        eligibility: Arc<EligibilityResolver>,
        tokens: Arc<TokenResolver>,
        gateway: Arc<dyn PushGateway>,
        tickets: Arc<dyn TicketRepository>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            eligibility,
            tokens,
            gateway,
            tickets,
            config: config.normalized(),
        }
    }

    /// Notify every eligible recipient in `candidates` about `beacon_id`.
    pub async fn fan_out(
        &self,
        beacon_id: &str,
        owner_uid: &str,
        content: &ComposedContent,
        candidates: &[String],
    ) -> FanoutReport {
        let ctx = FanoutContext {
            beacon_id,
            owner_uid,
            content,
        };

        let initial = FanoutReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        let report = stream::iter(candidates.to_vec())
            .map(move |recipient_uid| async move { self.deliver_to(ctx, &recipient_uid).await })
            .buffer_unordered(self.config.recipient_concurrency)
            .fold(initial, |mut total, partial| async move {
                total += partial;
                total
            })
            .await;

        info!(
            beacon_id,
            owner_uid,
            candidates = report.candidates,
            eligible = report.eligible,
            without_tokens = report.without_tokens,
            skipped = report.skipped_read_failure,
            sent = report.messages_sent,
            persisted = report.tickets_persisted,
            rejected = report.rejected_tickets,
            failed_batches = report.failed_batches,
            "Beacon fan-out finished"
        );
        report
    }

    async fn deliver_to(&self, ctx: FanoutContext<'_>, recipient_uid: &str) -> FanoutReport {
        let mut report = FanoutReport::default();

        match self.eligibility.check(recipient_uid, ctx.owner_uid).await {
            Eligibility::Eligible => report.eligible = 1,
            Eligibility::NotOptedIn => return report,
            Eligibility::Unknown => {
                report.skipped_read_failure = 1;
                return report;
            }
        }

        let tokens = match self.tokens.resolve(recipient_uid).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(
                    beacon_id = ctx.beacon_id,
                    recipient_uid,
                    error = %e,
                    "Failed to resolve push tokens, skipping recipient"
                );
                report.skipped_read_failure = 1;
                return report;
            }
        };
        if tokens.is_empty() {
            debug!(beacon_id = ctx.beacon_id, recipient_uid, "Recipient has no push tokens");
            report.without_tokens = 1;
            return report;
        }

        let messages: Vec<PushMessage> = tokens
            .iter()
            .map(|token| beacon_message(token, ctx.content, ctx.beacon_id, ctx.owner_uid))
            .collect();

        let batches: Vec<Vec<PushMessage>> = messages
            .chunks(self.config.send_batch_size)
            .map(<[_]>::to_vec)
            .collect();
        let batches = stream::iter(batches)
            .map(move |batch| async move { self.send_batch(ctx, recipient_uid, &batch).await })
            .buffer_unordered(self.config.batch_concurrency)
            .collect::<Vec<_>>()
            .await;
        for partial in batches {
            report += partial;
        }
        report
    }

    /// Send one batch and persist its accepted tickets.
    async fn send_batch(
        &self,
        ctx: FanoutContext<'_>,
        recipient_uid: &str,
        batch: &[PushMessage],
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        let tickets = match self.gateway.send_batch(batch).await {
            Ok(tickets) if tickets.len() == batch.len() => tickets,
            Ok(tickets) => {
                warn!(
                    beacon_id = ctx.beacon_id,
                    owner_uid = ctx.owner_uid,
                    recipient_uid,
                    expected = batch.len(),
                    actual = tickets.len(),
                    "Gateway returned misaligned tickets, dropping batch"
                );
                report.failed_batches = 1;
                return report;
            }
            Err(e) => {
                warn!(
                    beacon_id = ctx.beacon_id,
                    owner_uid = ctx.owner_uid,
                    recipient_uid,
                    messages = batch.len(),
                    error = %e,
                    "Push batch dispatch failed"
                );
                report.failed_batches = 1;
                return report;
            }
        };
        report.messages_sent = batch.len();

        let (rows, rejected) = pair_tickets(ctx, recipient_uid, batch, &tickets);
        report.rejected_tickets = rejected;
        if rows.is_empty() {
            return report;
        }

        match self.tickets.insert_pending(&rows).await {
            Ok(inserted) => report.tickets_persisted = inserted as usize,
            Err(e) => {
                error!(
                    beacon_id = ctx.beacon_id,
                    recipient_uid,
                    tickets = rows.len(),
                    error = %e,
                    "Failed to persist delivery tickets"
                );
                report.failed_persists = 1;
            }
        }
        report
    }
}

/// Zip a batch with its tickets by position. Returns the rows to persist and the
/// number of tickets the gateway rejected outright.
fn pair_tickets(
    ctx: FanoutContext<'_>,
    recipient_uid: &str,
    batch: &[PushMessage],
    tickets: &[PushTicket],
) -> (Vec<DeliveryTicketDbModel>, usize) {
    let mut rows = Vec::with_capacity(tickets.len());
    let mut rejected = 0;
    for (message, ticket) in batch.iter().zip(tickets) {
        match ticket.receipt_id() {
            Some(ticket_id) => rows.push(DeliveryTicketDbModel::pending(
                ticket_id,
                recipient_uid,
                ctx.owner_uid,
                ctx.beacon_id,
                &message.to,
            )),
            None => {
                debug!(
                    beacon_id = ctx.beacon_id,
                    recipient_uid,
                    code = ticket.error_code().map(|c| c.as_str()).unwrap_or("unknown"),
                    detail = ticket.message.as_deref().unwrap_or(""),
                    "Gateway rejected push message"
                );
                rejected += 1;
            }
        }
    }
    (rows, rejected)
}
