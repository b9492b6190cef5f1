//! Gmail REST API gateway.
//!
//! Lists `is:unread` messages (following `nextPageToken`), fetches them in
//! `format=full`, sends replies as base64url-encoded RFC 822 via
//! `messages/send`, and marks read by removing the `UNREAD` label.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::channels::auth::AuthProvider;
use crate::channels::email::build_reply_message;
use crate::error::GatewayError;
use crate::pipeline::types::{
    BodyPart, DeliveryReceipt, MailboxGateway, MessageHeader, RawMessage,
};

/// Gmail API root (without `/users/...`).
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const GATEWAY_NAME: &str = "gmail";

/// Largest page the list endpoint accepts.
const LIST_PAGE_SIZE: &str = "500";

// ── API response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(default)]
    payload: Option<GmailPart>,
}

/// Payload and MIME parts share one shape; parts nest arbitrarily.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    #[serde(default)]
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email_address: String,
}

impl GmailMessage {
    fn into_raw_message(self) -> RawMessage {
        let payload = self.payload.unwrap_or_default();

        let headers = payload
            .headers
            .iter()
            .map(|h| MessageHeader::new(&h.name, &h.value))
            .collect();

        let mut body_parts = Vec::new();
        collect_parts(&payload, &mut body_parts);

        RawMessage {
            id: self.id,
            headers,
            body_parts,
        }
    }
}

/// Depth-first leaf parts carrying inline data, in document order.
/// A single-part message keeps its data on the payload itself.
fn collect_parts(part: &GmailPart, out: &mut Vec<BodyPart>) {
    if part.parts.is_empty() {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            out.push(BodyPart::base64url(&part.mime_type, data));
        }
        return;
    }
    for child in &part.parts {
        collect_parts(child, out);
    }
}

/// Gmail ids are hex strings; reject anything that could alter the URL path.
fn validate_message_id(id: &str) -> Result<(), GatewayError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(GatewayError::InvalidMessageId(id.to_string()))
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

pub struct GmailGateway {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
    from_address: Option<String>,
    profile_address: OnceCell<String>,
}

impl GmailGateway {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_base_url(auth, GMAIL_API_BASE)
    }

    /// Point at a different API root (tests, proxies).
    pub fn with_base_url(auth: Arc<dyn AuthProvider>, base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            from_address: None,
            profile_address: OnceCell::new(),
        }
    }

    /// Use a fixed From address instead of looking up the account profile.
    pub fn with_from_address(mut self, from_address: Option<String>) -> Self {
        self.from_address = from_address;
        self
    }

    fn messages_url(&self, user_id: &str) -> String {
        format!("{}/users/{}/messages", self.base_url, user_id)
    }

    /// Attach the bearer token, send, and map non-2xx statuses.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let token = self.auth.access_token().await?;
        let resp = request.bearer_auth(token.expose_secret()).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("Gmail rejected the access token");
            self.auth.invalidate().await;
            return Err(GatewayError::AuthExpired {
                gateway: GATEWAY_NAME.into(),
            });
        }

        let message = resp.text().await.unwrap_or_default();
        Err(GatewayError::Api {
            gateway: GATEWAY_NAME.into(),
            status: status.as_u16(),
            message,
        })
    }

    async fn sender_address(&self, user_id: &str) -> Result<String, GatewayError> {
        if let Some(from) = &self.from_address {
            return Ok(from.clone());
        }
        self.profile_address
            .get_or_try_init(|| async {
                let url = format!("{}/users/{}/profile", self.base_url, user_id);
                let profile: ProfileResponse = self.execute(self.http.get(url)).await?.json().await?;
                debug!(address = %profile.email_address, "Resolved sender from profile");
                Ok::<_, GatewayError>(profile.email_address)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl MailboxGateway for GmailGateway {
    fn name(&self) -> &str {
        GATEWAY_NAME
    }

    async fn list_unread(&self, user_id: &str) -> Result<Vec<String>, GatewayError> {
        let url = self.messages_url(user_id);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("q", "is:unread"), ("maxResults", LIST_PAGE_SIZE)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let page: ListMessagesResponse = self
                .execute(self.http.get(&url).query(&query))
                .await?
                .json()
                .await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = ids.len(), "Gmail unread messages");
        Ok(ids)
    }

    async fn get_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, GatewayError> {
        validate_message_id(message_id)?;
        let url = format!("{}/{}", self.messages_url(user_id), message_id);

        let resp = match self
            .execute(self.http.get(url).query(&[("format", "full")]))
            .await
        {
            Err(GatewayError::Api { status: 404, .. }) => {
                return Err(GatewayError::NotFound {
                    id: message_id.to_string(),
                });
            }
            other => other?,
        };

        let message: GmailMessage = resp.json().await?;
        Ok(message.into_raw_message())
    }

    async fn send_reply(
        &self,
        user_id: &str,
        to_address: &str,
        subject: &str,
        body_text: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        let from = self.sender_address(user_id).await?;
        let email = build_reply_message(&from, to_address, subject, body_text)?;
        let raw = URL_SAFE_NO_PAD.encode(email.formatted());

        let url = format!("{}/send", self.messages_url(user_id));
        let sent: SendResponse = self
            .execute(self.http.post(url).json(&json!({ "raw": raw })))
            .await?
            .json()
            .await?;

        info!(to = %to_address, id = %sent.id, "Reply sent via Gmail");
        Ok(DeliveryReceipt { id: sent.id })
    }

    async fn mark_read(&self, user_id: &str, message_id: &str) -> Result<(), GatewayError> {
        validate_message_id(message_id)?;
        let url = format!("{}/{}/modify", self.messages_url(user_id), message_id);
        self.execute(
            self.http
                .post(url)
                .json(&json!({ "removeLabelIds": ["UNREAD"] })),
        )
        .await?;
        Ok(())
    }
}
