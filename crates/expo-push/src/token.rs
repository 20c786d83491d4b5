//! Push token format checks.

use std::sync::LazyLock;

use regex::Regex;

static BARE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-z]{8}-[0-9a-z]{4}-[0-9a-z]{4}-[0-9a-z]{4}-[0-9a-z]{12}$")
        .expect("static push token regex")
});

/// Returns `true` if `token` looks like a token the push service accepts.
///
/// Accepted forms are `ExponentPushToken[...]`, `ExpoPushToken[...]` and the bare
/// UUID-shaped form. The check is purely syntactic: a well-formed token may still be
/// unregistered on the device side.
pub fn is_expo_push_token(token: &str) -> bool {
    let bracketed = (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']');
    bracketed || BARE_TOKEN_RE.is_match(token)
}
