//! HTTP client for the push service.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::types::{
    PushMessage, PushReceipt, PushTicket, ReceiptsRequest, ReceiptsResponse, RequestError,
    SendResponse,
};
use crate::{PUSH_NOTIFICATION_CHUNK_LIMIT, PUSH_RECEIPT_CHUNK_LIMIT};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://exp.host/--/api/v2";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_CHARS: usize = 500;

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Optional access token for projects with enhanced push security.
    pub access_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Push service client.
#[derive(Debug, Clone)]
pub struct ExpoClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExpoClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        install_rustls_provider();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                Error::Configuration {
                    reason: format!("invalid access token: {e}"),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send one batch of messages.
    ///
    /// The returned tickets are index-aligned with `messages`. A response carrying a
    /// different number of tickets is rejected as a whole, since the pairing of ticket
    /// to message could no longer be trusted.
    pub async fn send_push_notifications(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<PushTicket>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        if messages.len() > PUSH_NOTIFICATION_CHUNK_LIMIT {
            return Err(Error::Configuration {
                reason: format!(
                    "batch of {} messages exceeds the limit of {}",
                    messages.len(),
                    PUSH_NOTIFICATION_CHUNK_LIMIT
                ),
            });
        }

        let url = format!("{}/push/send", self.base_url);
        trace!(count = messages.len(), "Sending push batch");

        let response = self.http.post(&url).json(messages).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status,
                operation: "push/send",
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        decode_send_response(&body, messages.len())
    }

    /// Fetch receipts for previously issued tickets.
    ///
    /// Ids whose receipt is not available yet are simply absent from the map.
    pub async fn get_push_notification_receipts(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PushReceipt>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        if ids.len() > PUSH_RECEIPT_CHUNK_LIMIT {
            return Err(Error::Configuration {
                reason: format!(
                    "receipt query of {} ids exceeds the limit of {}",
                    ids.len(),
                    PUSH_RECEIPT_CHUNK_LIMIT
                ),
            });
        }

        let url = format!("{}/push/getReceipts", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&ReceiptsRequest { ids })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status,
                operation: "push/getReceipts",
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        decode_receipts_response(&body)
    }
}

fn request_error(errors: Option<Vec<RequestError>>) -> Option<Error> {
    let first = errors?.into_iter().next()?;
    Some(Error::Request {
        code: first.code,
        message: first.message,
    })
}

pub(crate) fn decode_send_response(body: &str, expected: usize) -> Result<Vec<PushTicket>> {
    let response: SendResponse = serde_json::from_str(body)?;
    let Some(tickets) = response.data else {
        return Err(request_error(response.errors).unwrap_or(Error::TicketCountMismatch {
            expected,
            actual: 0,
        }));
    };

    if tickets.len() != expected {
        return Err(Error::TicketCountMismatch {
            expected,
            actual: tickets.len(),
        });
    }
    Ok(tickets)
}

pub(crate) fn decode_receipts_response(body: &str) -> Result<HashMap<String, PushReceipt>> {
    let response: ReceiptsResponse = serde_json::from_str(body)?;
    match response.data {
        Some(receipts) => Ok(receipts),
        None => match request_error(response.errors) {
            Some(err) => Err(err),
            None => Ok(HashMap::new()),
        },
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    let mut out: String = input.chars().take(max_chars).collect();
    if input.chars().nth(max_chars).is_some() {
        out.push('…');
    }
    out
}
