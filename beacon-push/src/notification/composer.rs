//! Beacon notification content.

use expo_push::{PushMessage, PushPriority};
use serde_json::{Map, Value};

pub const FALLBACK_TITLE: &str = "A friend lit a beacon";
pub const FALLBACK_BODY: &str = "Tap to see what's happening.";

/// `type` tag clients route beacon pushes on.
pub const BEACON_MESSAGE_TYPE: &str = "beacon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedContent {
    pub title: String,
    pub body: String,
}

/// Blank strings count as absent.
pub fn compose(
    owner_name: Option<&str>,
    message: Option<&str>,
    details: Option<&str>,
) -> ComposedContent {
    let title = match non_blank(owner_name) {
        Some(name) => format!("{name} lit a beacon"),
        None => FALLBACK_TITLE.to_string(),
    };
    let body = non_blank(message)
        .or_else(|| non_blank(details))
        .unwrap_or(FALLBACK_BODY)
        .to_string();
    ComposedContent { title, body }
}

/// One push message addressed to `token`, tagged for client-side routing.
pub fn beacon_message(
    token: &str,
    content: &ComposedContent,
    beacon_id: &str,
    owner_uid: &str,
) -> PushMessage {
    let mut data = Map::new();
    data.insert("type".to_string(), Value::from(BEACON_MESSAGE_TYPE));
    data.insert("beaconId".to_string(), Value::from(beacon_id));
    data.insert("ownerUid".to_string(), Value::from(owner_uid));

    PushMessage::new(token)
        .with_title(content.title.clone())
        .with_body(content.body.clone())
        .with_data(data)
        .with_sound("default")
        .with_priority(PushPriority::High)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
