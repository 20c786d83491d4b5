//! Delivery ticket repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{DeliveryTicketDbModel, TicketStatus, TicketStatusUpdate};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Delivery ticket repository trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Insert `pending` tickets in one transaction. Ticket ids already present are
    /// left untouched. Returns the number of rows inserted.
    async fn insert_pending(&self, tickets: &[DeliveryTicketDbModel]) -> Result<u64>;

    /// Pending tickets created at or after `cutoff_ms`, oldest first.
    async fn list_pending_since(&self, cutoff_ms: i64) -> Result<Vec<DeliveryTicketDbModel>>;

    /// Apply terminal statuses in one transaction.
    ///
    /// Only rows still `pending` are touched, so replaying the same updates is a
    /// no-op. Returns the number of rows that changed.
    async fn apply_updates(&self, updates: &[TicketStatusUpdate]) -> Result<u64>;

    async fn get(&self, ticket_id: &str) -> Result<DeliveryTicketDbModel>;

    async fn list_for_beacon(&self, beacon_id: &str) -> Result<Vec<DeliveryTicketDbModel>>;
}

/// SQLx implementation of [`TicketRepository`].
pub struct SqlxTicketRepository {
    pool: SqlitePool,
}

impl SqlxTicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_pending_once(&self, tickets: &[DeliveryTicketDbModel]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for ticket in tickets {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO delivery_tickets (
                    ticket_id, status, recipient_uid, owner_uid, beacon_id, token,
                    created_at, updated_at, error_code, error_message
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&ticket.ticket_id)
            .bind(TicketStatus::Pending.as_str())
            .bind(&ticket.recipient_uid)
            .bind(&ticket.owner_uid)
            .bind(&ticket.beacon_id)
            .bind(&ticket.token)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .bind(&ticket.error_code)
            .bind(&ticket.error_message)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn apply_updates_once(&self, updates: &[TicketStatusUpdate]) -> Result<u64> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE delivery_tickets SET
                    status = ?,
                    error_code = ?,
                    error_message = ?,
                    updated_at = ?
                WHERE ticket_id = ? AND status = 'pending'
                "#,
            )
            .bind(update.status.as_str())
            .bind(&update.error_code)
            .bind(&update.error_message)
            .bind(now)
            .bind(&update.ticket_id)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }
}

#[async_trait]
impl TicketRepository for SqlxTicketRepository {
    async fn insert_pending(&self, tickets: &[DeliveryTicketDbModel]) -> Result<u64> {
        if tickets.is_empty() {
            return Ok(0);
        }
        retry_on_sqlite_busy("insert_pending_tickets", || self.insert_pending_once(tickets)).await
    }

    async fn list_pending_since(&self, cutoff_ms: i64) -> Result<Vec<DeliveryTicketDbModel>> {
        let tickets = sqlx::query_as::<_, DeliveryTicketDbModel>(
            r#"
            SELECT * FROM delivery_tickets
            WHERE status = 'pending' AND created_at >= ?
            ORDER BY created_at ASC, ticket_id ASC
            "#,
        )
        .bind(cutoff_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn apply_updates(&self, updates: &[TicketStatusUpdate]) -> Result<u64> {
        for update in updates {
            TicketStatus::Pending.transition_to(update.status)?;
        }
        if updates.is_empty() {
            return Ok(0);
        }
        retry_on_sqlite_busy("apply_ticket_updates", || self.apply_updates_once(updates)).await
    }

    async fn get(&self, ticket_id: &str) -> Result<DeliveryTicketDbModel> {
        sqlx::query_as::<_, DeliveryTicketDbModel>(
            "SELECT * FROM delivery_tickets WHERE ticket_id = ?",
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("DeliveryTicket", ticket_id))
    }

    async fn list_for_beacon(&self, beacon_id: &str) -> Result<Vec<DeliveryTicketDbModel>> {
        let tickets = sqlx::query_as::<_, DeliveryTicketDbModel>(
            "SELECT * FROM delivery_tickets WHERE beacon_id = ? ORDER BY created_at, ticket_id",
        )
        .bind(beacon_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }
}
