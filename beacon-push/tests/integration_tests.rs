//! End-to-end tests for the beacon push pipeline.
//!
//! These run against a real SQLite file with the schema applied and an in-memory
//! push gateway that records what it was asked to send.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_push::Result;
use beacon_push::config::PipelineConfig;
use beacon_push::database::repositories::{
    DeviceTokenRepository, PreferenceRepository, TicketRepository, UserRepository,
};
use beacon_push::database::models::{
    DeliveryTicketDbModel, DeviceTokenDbModel, TicketStatus, TicketStatusUpdate, UserDbModel,
    UserProfileDbModel,
};
use beacon_push::database::time::now_ms;
use beacon_push::database::{DbPool, init_pool_with_size, run_migrations};
use beacon_push::notification::{PushGateway, TriggerOutcome};
use beacon_push::services::ServiceContainer;
use expo_push::{PushErrorCode, PushMessage, PushReceipt, PushTicket};
use rstest::rstest;
use serde_json::{Value, json};
use tempfile::TempDir;

const OWNER: &str = "owner";
const R1: &str = "recipient-1";
const R2: &str = "recipient-2";
const R1_TOKEN: &str = "ExponentPushToken[r1-phone]";
const R2_TOKEN: &str = "ExponentPushToken[r2-phone]";

/// Accepts every message with a fresh ticket id and answers receipt queries from a
/// table the test fills in.
#[derive(Default)]
struct FakeGateway {
    next_ticket: AtomicUsize,
    sent: Mutex<Vec<PushMessage>>,
    /// Ticket id by the token it was sent to.
    tickets_by_token: Mutex<HashMap<String, String>>,
    receipts: Mutex<HashMap<String, PushReceipt>>,
    polled: Mutex<Vec<String>>,
}

impl FakeGateway {
    fn sent_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to.clone())
            .collect();
        tokens.sort();
        tokens
    }

    fn ticket_for(&self, token: &str) -> String {
        self.tickets_by_token.lock().unwrap()[token].clone()
    }

    fn set_receipt(&self, ticket_id: &str, receipt: PushReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(ticket_id.to_string(), receipt);
    }
}

#[async_trait]
impl PushGateway for FakeGateway {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>> {
        let mut tickets = Vec::with_capacity(messages.len());
        for message in messages {
            let id = format!("ticket-{}", self.next_ticket.fetch_add(1, Ordering::SeqCst));
            self.tickets_by_token
                .lock()
                .unwrap()
                .insert(message.to.clone(), id.clone());
            self.sent.lock().unwrap().push(message.clone());
            tickets.push(PushTicket::ok(id));
        }
        Ok(tickets)
    }

    async fn get_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, PushReceipt>> {
        self.polled.lock().unwrap().extend(ticket_ids.iter().cloned());
        let receipts = self.receipts.lock().unwrap();
        Ok(ticket_ids
            .iter()
            .filter_map(|id| receipts.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}

struct TestEnv {
    // Keeps the database file alive for the test's duration.
    _dir: TempDir,
    pool: DbPool,
    gateway: Arc<FakeGateway>,
    services: ServiceContainer,
}

/// Helper to create a file-backed test database with migrations applied.
async fn setup_test_env() -> TestEnv {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}", dir.path().join("beacon-push.db").display());
    let pool = init_pool_with_size(&url, 4)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let gateway = Arc::new(FakeGateway::default());
    let config = PipelineConfig {
        ticket_ttl: Duration::from_secs(48 * 60 * 60),
        ..Default::default()
    };
    let services = ServiceContainer::new(pool.clone(), gateway.clone(), config);

    TestEnv {
        _dir: dir,
        pool,
        gateway,
        services,
    }
}

impl TestEnv {
    async fn add_device(&self, uid: &str, installation: &str, token: &str) {
        self.services
            .device_tokens
            .upsert(&DeviceTokenDbModel::new(uid, installation, token, "ios"))
            .await
            .unwrap();
    }

    async fn subscribe(&self, uid: &str) {
        self.services
            .preferences
            .set_subscription(uid, OWNER, true)
            .await
            .unwrap();
    }

    async fn legacy_opt_in(&self, uid: &str) {
        self.services
            .preferences
            .set_friend_preference(uid, OWNER, true)
            .await
            .unwrap();
    }

    /// R1 opted in canonically, R2 only through the legacy preference, one device each.
    async fn seed_two_recipients(&self) {
        self.subscribe(R1).await;
        self.legacy_opt_in(R2).await;
        self.add_device(R1, "phone", R1_TOKEN).await;
        self.add_device(R2, "phone", R2_TOKEN).await;
    }

    async fn tickets(&self, beacon_id: &str) -> Vec<DeliveryTicketDbModel> {
        self.services.tickets.list_for_beacon(beacon_id).await.unwrap()
    }
}

fn beacon(active: bool, allowed: &[&str]) -> Value {
    json!({
        "ownerUid": OWNER,
        "ownerName": "Olive",
        "active": active,
        "allowedUids": allowed,
        "message": "Board games at mine"
    })
}

mod database_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let env = setup_test_env().await;
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&env.pool)
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }
}

mod fanout_tests {
    use super::*;

    #[tokio::test]
    async fn test_activation_reaches_both_preference_locations() {
        let env = setup_test_env().await;
        env.seed_two_recipients().await;

        let outcome = env
            .services
            .trigger
            .on_create("beacon-1", &beacon(true, &[R1, R2]))
            .await;

        let TriggerOutcome::Dispatched(report) = outcome else {
            panic!("expected dispatch, got {outcome:?}");
        };
        assert_eq!(report.eligible, 2);
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.tickets_persisted, 2);
        assert_eq!(env.gateway.sent_tokens(), vec![R1_TOKEN, R2_TOKEN]);

        let tickets = env.tickets("beacon-1").await;
        assert_eq!(tickets.len(), 2);
        for ticket in &tickets {
            assert_eq!(ticket.status(), Some(TicketStatus::Pending));
            assert_eq!(ticket.owner_uid, OWNER);
            let expected_token = if ticket.recipient_uid == R1 { R1_TOKEN } else { R2_TOKEN };
            assert_eq!(ticket.token, expected_token);
            assert_eq!(ticket.ticket_id, env.gateway.ticket_for(expected_token));
        }

        let sent = env.gateway.sent.lock().unwrap().clone();
        assert_eq!(sent[0].title.as_deref(), Some("Olive lit a beacon"));
        assert_eq!(sent[0].body.as_deref(), Some("Board games at mine"));
        let data = sent[0].data.as_ref().unwrap();
        assert_eq!(data["type"], "beacon");
        assert_eq!(data["beaconId"], "beacon-1");
        assert_eq!(data["ownerUid"], OWNER);
    }

    #[tokio::test]
    async fn test_recipient_without_valid_tokens_gets_nothing() {
        let env = setup_test_env().await;
        env.seed_two_recipients().await;
        env.services
            .device_tokens
            .delete_token(R1, R1_TOKEN)
            .await
            .unwrap();
        env.add_device(R1, "tablet", "not-a-push-token").await;
        env.services
            .users
            .upsert_user(&UserDbModel {
                uid: R1.to_string(),
                display_name: None,
                push_token: Some("   ".to_string()),
            })
            .await
            .unwrap();

        let outcome = env
            .services
            .trigger
            .on_create("beacon-2", &beacon(true, &[R1, R2]))
            .await;

        let TriggerOutcome::Dispatched(report) = outcome else {
            panic!("expected dispatch, got {outcome:?}");
        };
        assert_eq!(report.without_tokens, 1);
        assert_eq!(env.gateway.sent_tokens(), vec![R2_TOKEN]);

        let tickets = env.tickets("beacon-2").await;
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].recipient_uid, R2);
    }

    #[tokio::test]
    async fn test_token_union_dedupes_and_drops_blanks() {
        let env = setup_test_env().await;
        let a = "ExponentPushToken[a]";
        let b = "ExponentPushToken[b]";
        env.subscribe(R1).await;
        env.add_device(R1, "phone", a).await;
        env.add_device(R1, "tablet", b).await;
        env.services
            .users
            .upsert_user(&UserDbModel {
                uid: R1.to_string(),
                display_name: None,
                push_token: Some(b.to_string()),
            })
            .await
            .unwrap();
        env.services
            .users
            .upsert_profile(&UserProfileDbModel {
                uid: R1.to_string(),
                push_token: Some(String::new()),
            })
            .await
            .unwrap();

        env.services
            .trigger
            .on_create("beacon-3", &beacon(true, &[R1]))
            .await;

        assert_eq!(env.gateway.sent_tokens(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_exactly_one_pass_per_activation() {
        let env = setup_test_env().await;
        env.seed_two_recipients().await;
        let trigger = &env.services.trigger;

        let inactive = beacon(false, &[R1, R2]);
        let active = beacon(true, &[R1, R2]);

        assert!(!trigger.on_create("beacon-4", &inactive).await.is_dispatched());
        assert!(
            !trigger
                .on_update("beacon-4", &inactive, &inactive)
                .await
                .is_dispatched()
        );
        assert!(
            trigger
                .on_update("beacon-4", &inactive, &active)
                .await
                .is_dispatched()
        );
        // Re-saving an active beacon, e.g. an edited message, is not a new activation.
        let mut edited = active.clone();
        edited["message"] = json!("Changed plans");
        assert!(
            !trigger
                .on_update("beacon-4", &active, &edited)
                .await
                .is_dispatched()
        );
        assert!(
            !trigger
                .on_update("beacon-4", &active, &beacon(false, &[R1, R2]))
                .await
                .is_dispatched()
        );

        assert_eq!(env.gateway.sent_tokens(), vec![R1_TOKEN, R2_TOKEN]);
        assert_eq!(env.tickets("beacon-4").await.len(), 2);
    }

    #[tokio::test]
    async fn test_audience_scoping() {
        let env = setup_test_env().await;
        env.seed_two_recipients().await;
        // Opted in and has a token, but outside this beacon's audience.
        let outsider = "recipient-3";
        env.subscribe(outsider).await;
        env.add_device(outsider, "phone", "ExponentPushToken[r3]").await;

        let empty = env
            .services
            .trigger
            .on_create("beacon-5", &beacon(true, &[]))
            .await;
        assert_eq!(
            empty,
            TriggerOutcome::Dispatched(Default::default()),
            "an empty audience notifies nobody"
        );

        env.services
            .trigger
            .on_create("beacon-6", &beacon(true, &[OWNER, R1, R1]))
            .await;
        assert_eq!(env.gateway.sent_tokens(), vec![R1_TOKEN]);
    }

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, true)]
    #[case(false, true, true)]
    #[case(true, true, true)]
    #[tokio::test]
    async fn test_eligibility_is_or_of_both_locations(
        #[case] canonical: bool,
        #[case] legacy: bool,
        #[case] eligible: bool,
    ) {
        let env = setup_test_env().await;
        env.services
            .preferences
            .set_subscription(R1, OWNER, canonical)
            .await
            .unwrap();
        env.services
            .preferences
            .set_friend_preference(R1, OWNER, legacy)
            .await
            .unwrap();
        env.add_device(R1, "phone", R1_TOKEN).await;

        env.services
            .trigger
            .on_create("beacon-7", &beacon(true, &[R1]))
            .await;

        assert_eq!(env.tickets("beacon-7").await.len() == 1, eligible);
    }
}

mod reconcile_tests {
    use super::*;

    #[tokio::test]
    async fn test_unregistered_device_is_marked_and_pruned() {
        let env = setup_test_env().await;
        env.seed_two_recipients().await;
        env.services
            .trigger
            .on_create("beacon-8", &beacon(true, &[R1, R2]))
            .await;

        let r1_ticket = env.gateway.ticket_for(R1_TOKEN);
        let r2_ticket = env.gateway.ticket_for(R2_TOKEN);
        env.gateway.set_receipt(
            &r1_ticket,
            PushReceipt::error(
                "\"ExponentPushToken[r1-phone]\" is not a registered push notification recipient",
                PushErrorCode::DeviceNotRegistered,
            ),
        );

        let first = env.services.reconciler.run_once().await.unwrap();
        assert_eq!(first.polled, 2);
        assert_eq!(first.error, 1);
        assert_eq!(first.still_pending, 1);
        assert_eq!(first.tokens_pruned, 1);

        let failed = env.services.tickets.get(&r1_ticket).await.unwrap();
        assert_eq!(failed.status(), Some(TicketStatus::Error));
        assert_eq!(failed.error_code.as_deref(), Some("DeviceNotRegistered"));
        assert!(
            env.services
                .device_tokens
                .list_for_user(R1)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            env.services.device_tokens.list_for_user(R2).await.unwrap().len(),
            1
        );

        // A second tick no longer sees the resolved ticket.
        env.gateway.polled.lock().unwrap().clear();
        let second = env.services.reconciler.run_once().await.unwrap();
        assert_eq!(second.polled, 1);
        assert_eq!(second.error, 0);
        assert_eq!(second.tokens_pruned, 0);
        assert_eq!(*env.gateway.polled.lock().unwrap(), vec![r2_ticket.clone()]);
        assert_eq!(env.services.tickets.get(&r1_ticket).await.unwrap(), failed);

        env.gateway.set_receipt(&r2_ticket, PushReceipt::ok());
        let third = env.services.reconciler.run_once().await.unwrap();
        assert_eq!(third.ok, 1);
        assert_eq!(
            env.services.tickets.get(&r2_ticket).await.unwrap().status(),
            Some(TicketStatus::Ok)
        );
    }

    #[tokio::test]
    async fn test_padded_device_token_is_pruned() {
        let env = setup_test_env().await;
        env.subscribe(R1).await;
        env.add_device(R1, "phone", &format!("  {R1_TOKEN}\n")).await;

        env.services
            .trigger
            .on_create("beacon-10", &beacon(true, &[R1]))
            .await;
        assert_eq!(env.gateway.sent_tokens(), vec![R1_TOKEN.to_string()]);

        let ticket = env.gateway.ticket_for(R1_TOKEN);
        env.gateway.set_receipt(
            &ticket,
            PushReceipt::error("not registered", PushErrorCode::DeviceNotRegistered),
        );

        let summary = env.services.reconciler.run_once().await.unwrap();
        assert_eq!(summary.error, 1);
        assert_eq!(summary.tokens_pruned, 1);
        assert!(
            env.services
                .device_tokens
                .list_for_user(R1)
                .await
                .unwrap()
                .is_empty()
        );

        // The next activation has nothing left to send to.
        env.services
            .trigger
            .on_create("beacon-11", &beacon(true, &[R1]))
            .await;
        assert_eq!(env.gateway.sent_tokens(), vec![R1_TOKEN.to_string()]);
    }

    #[tokio::test]
    async fn test_replaying_a_receipt_changes_nothing() {
        let env = setup_test_env().await;
        env.services
            .tickets
            .insert_pending(&[DeliveryTicketDbModel::pending(
                "ticket-x", R1, OWNER, "beacon-9", R1_TOKEN,
            )])
            .await
            .unwrap();

        let update = TicketStatusUpdate::ok("ticket-x");
        assert_eq!(
            env.services
                .tickets
                .apply_updates(std::slice::from_ref(&update))
                .await
                .unwrap(),
            1
        );
        let settled = env.services.tickets.get("ticket-x").await.unwrap();

        assert_eq!(
            env.services
                .tickets
                .apply_updates(std::slice::from_ref(&update))
                .await
                .unwrap(),
            0
        );
        assert_eq!(env.services.tickets.get("ticket-x").await.unwrap(), settled);
    }

    #[tokio::test]
    async fn test_tickets_past_ttl_are_never_polled() {
        let env = setup_test_env().await;
        let fifty_hours_ago = now_ms() - 50 * 60 * 60 * 1000;
        let stale = DeliveryTicketDbModel {
            created_at: fifty_hours_ago,
            updated_at: fifty_hours_ago,
            ..DeliveryTicketDbModel::pending("ticket-old", R1, OWNER, "beacon-10", R1_TOKEN)
        };
        env.services.tickets.insert_pending(&[stale]).await.unwrap();
        env.gateway.set_receipt("ticket-old", PushReceipt::ok());

        let summary = env.services.reconciler.run_once().await.unwrap();

        assert_eq!(summary.polled, 0);
        assert!(env.gateway.polled.lock().unwrap().is_empty());
        assert_eq!(
            env.services.tickets.get("ticket-old").await.unwrap().status(),
            Some(TicketStatus::Pending)
        );
    }
}
