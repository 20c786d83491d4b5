//! Beacon push pipeline.
//!
//! Two independent paths share the delivery ticket table:
//!
//! - **Fan-out**: [`BeaconTrigger`] reacts to beacon activations, [`EligibilityResolver`]
//!   narrows the audience to opted-in recipients, [`TokenResolver`] collects their
//!   push tokens, and [`FanoutSender`] dispatches and records one `pending` ticket per
//!   accepted message.
//! - **Reconciliation**: [`ReceiptReconciler`] periodically resolves pending tickets
//!   against gateway receipts and prunes tokens of unregistered devices.

pub mod beacon;
pub mod composer;
pub mod eligibility;
pub mod gateway;
pub mod receipts;
pub mod sender;
pub mod tokens;
pub mod trigger;

pub use beacon::Beacon;
pub use composer::{ComposedContent, compose};
pub use eligibility::{
    Eligibility, EligibilityResolver, FriendPreferenceSource, PreferenceSource,
    SubscriptionPreferenceSource,
};
pub use gateway::PushGateway;
pub use receipts::{ReceiptReconciler, ReconcileSummary};
pub use sender::{FanoutReport, FanoutSender};
pub use tokens::{DeviceTokenSource, ProfileTokenSource, TokenResolver, TokenSource, UserTokenSource};
pub use trigger::{BeaconTrigger, SkipReason, TriggerOutcome};
