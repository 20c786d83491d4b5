//! Delivery ticket models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Error;
use crate::database::time::now_ms;

/// Lifecycle of a delivery ticket.
///
/// `Pending` moves to `Ok` or `Error` exactly once; both are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Pending,
    Ok,
    Error,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, target: TicketStatus) -> bool {
        !self.is_terminal() && target.is_terminal()
    }

    pub fn transition_to(&self, target: TicketStatus) -> Result<TicketStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

/// One row per gateway send attempt that returned a ticket id.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DeliveryTicketDbModel {
    /// Gateway-issued ticket id.
    pub ticket_id: String,
    pub status: String,
    pub recipient_uid: String,
    pub owner_uid: String,
    pub beacon_id: String,
    /// Push token the message was addressed to.
    pub token: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl DeliveryTicketDbModel {
    /// A fresh `pending` ticket stamped with the current time.
    pub fn pending(
        ticket_id: impl Into<String>,
        recipient_uid: impl Into<String>,
        owner_uid: impl Into<String>,
        beacon_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            ticket_id: ticket_id.into(),
            status: TicketStatus::Pending.as_str().to_string(),
            recipient_uid: recipient_uid.into(),
            owner_uid: owner_uid.into(),
            beacon_id: beacon_id.into(),
            token: token.into(),
            created_at: now,
            updated_at: now,
            error_code: None,
            error_message: None,
        }
    }

    pub fn status(&self) -> Option<TicketStatus> {
        self.status.parse().ok()
    }
}

/// Terminal status to apply to a pending ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketStatusUpdate {
    pub ticket_id: String,
    pub status: TicketStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl TicketStatusUpdate {
    pub fn ok(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            status: TicketStatus::Ok,
            error_code: None,
            error_message: None,
        }
    }

    pub fn error(
        ticket_id: impl Into<String>,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            status: TicketStatus::Error,
            error_code,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_strings() {
        assert_eq!(TicketStatus::Pending.as_str(), "pending");
        assert_eq!(TicketStatus::Ok.to_string(), "ok");
        assert_eq!(TicketStatus::from_str("error").unwrap(), TicketStatus::Error);
        assert!(TicketStatus::from_str("ERROR").is_err());
    }

    #[test]
    fn test_unknown_stored_status() {
        let mut ticket = DeliveryTicketDbModel::pending("t1", "r1", "o1", "b1", "ExpoPushToken[x]");
        ticket.status = "expired".to_string();
        assert_eq!(ticket.status(), None);
    }

    #[test]
    fn test_transitions_are_one_shot() {
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Ok));
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Error));
        assert!(!TicketStatus::Ok.can_transition_to(TicketStatus::Error));
        assert!(!TicketStatus::Error.can_transition_to(TicketStatus::Ok));
        assert!(!TicketStatus::Ok.can_transition_to(TicketStatus::Ok));
        assert!(!TicketStatus::Pending.can_transition_to(TicketStatus::Pending));
        assert!(TicketStatus::Ok.transition_to(TicketStatus::Error).is_err());
    }

    #[test]
    fn test_pending_ticket() {
        let ticket = DeliveryTicketDbModel::pending("t1", "r1", "o1", "b1", "ExpoPushToken[x]");
        assert_eq!(ticket.status(), Some(TicketStatus::Pending));
        assert_eq!(ticket.created_at, ticket.updated_at);
        assert!(ticket.error_code.is_none());
    }
}
