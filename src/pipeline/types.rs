//! Shared types for the auto-reply pipeline.

use std::collections::BTreeSet;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

// ── Keywords ────────────────────────────────────────────────────────

/// A content word extracted from message text, kept in its surface form.
pub type Keyword = String;

/// Deduplicated keywords extracted from one message.
///
/// Ordered so that log output is stable between runs.
pub type KeywordSet = BTreeSet<Keyword>;

// ── Fetched message ─────────────────────────────────────────────────

/// A single message header, in the order the provider returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// How a body part's `data` is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    /// URL-safe base64, padded or not (Gmail API).
    Base64Url,
    /// Already-decoded text (IMAP after MIME parsing).
    Identity,
}

/// One body part of a fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyPart {
    /// MIME type of the part, e.g. `text/plain`.
    pub mime_type: String,
    pub encoding: BodyEncoding,
    pub data: String,
}

impl BodyPart {
    pub fn base64url(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            encoding: BodyEncoding::Base64Url,
            data: data.into(),
        }
    }

    pub fn text(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            encoding: BodyEncoding::Identity,
            data: data.into(),
        }
    }

    /// Decode this part to readable text.
    ///
    /// Returns `None` when the data is not valid base64 or not UTF-8.
    /// HTML parts are reduced to their text content.
    pub fn decode(&self) -> Option<String> {
        let raw = match self.encoding {
            BodyEncoding::Identity => self.data.clone(),
            BodyEncoding::Base64Url => {
                let trimmed = self.data.trim().trim_end_matches('=');
                let bytes = URL_SAFE_NO_PAD.decode(trimmed).ok()?;
                String::from_utf8(bytes).ok()?
            }
        };

        if self.mime_type.eq_ignore_ascii_case("text/html") {
            Some(strip_html(&raw))
        } else {
            Some(raw)
        }
    }
}

/// Reduce HTML to its text content, one space between elements.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A message as returned by [`MailboxGateway::get_message`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Provider-native message id.
    pub id: String,
    pub headers: Vec<MessageHeader>,
    pub body_parts: Vec<BodyPart>,
}

impl RawMessage {
    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Subject line, or the empty string when the header is absent.
    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or("")
    }

    /// Address the auto-reply goes to: the message's own `To` header.
    pub fn reply_address(&self) -> Option<&str> {
        self.header("To")
            .map(str::trim)
            .filter(|to| !to.is_empty())
    }

    /// Text of the first decodable body part, or the empty string.
    pub fn body_text(&self) -> String {
        self.body_parts
            .iter()
            .find_map(BodyPart::decode)
            .unwrap_or_default()
    }

    /// Subject and body joined by a single space, the extractor's input.
    pub fn match_text(&self) -> String {
        format!("{} {}", self.subject(), self.body_text())
    }
}

/// Provider confirmation that a reply was accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider id of the sent message (Gmail id, SMTP response, ...).
    pub id: String,
}

// ── Mailbox gateway trait ───────────────────────────────────────────

/// Mail provider integration. Pure I/O, no business logic.
///
/// Keyword extraction, matching and the reply decision live in
/// `AutoResponder`. Implementations must not retry on their own.
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Gateway name (e.g. "gmail", "imap").
    fn name(&self) -> &str;

    /// Ids of all currently unread messages, in provider order.
    async fn list_unread(&self, user_id: &str) -> Result<Vec<String>, GatewayError>;

    /// Fetch headers and body parts of one message without changing its state.
    async fn get_message(&self, user_id: &str, message_id: &str)
    -> Result<RawMessage, GatewayError>;

    /// Send a plain-text reply.
    async fn send_reply(
        &self,
        user_id: &str,
        to_address: &str,
        subject: &str,
        body_text: &str,
    ) -> Result<DeliveryReceipt, GatewayError>;

    /// Mark a message as read.
    async fn mark_read(&self, user_id: &str, message_id: &str) -> Result<(), GatewayError>;
}

// ── Outcomes ────────────────────────────────────────────────────────

/// What happened to one message during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Reply sent and message marked read.
    Replied {
        template: usize,
        score: f64,
        receipt: DeliveryReceipt,
    },
    /// No template exceeded the threshold; message left unread.
    NoMatch,
    /// Dry run: a template matched but nothing was sent.
    DryRun { template: usize, score: f64 },
    /// Matched, but the message has no `To` address to reply to.
    MissingRecipient,
    /// Keyword extraction failed for this message.
    ExtractionFailed { reason: String },
    /// The message could not be fetched.
    FetchFailed { reason: String },
    /// The gateway rejected the reply; message left unread.
    SendFailed { reason: String },
    /// Reply sent but the message could not be marked read.
    MarkReadFailed { reason: String },
}

impl MessageOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Replied { .. } => "replied",
            Self::NoMatch => "no_match",
            Self::DryRun { .. } => "dry_run",
            Self::MissingRecipient => "missing_recipient",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::SendFailed { .. } => "send_failed",
            Self::MarkReadFailed { .. } => "mark_read_failed",
        }
    }
}

/// Counts for one pass over the unread snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Size of the unread snapshot.
    pub total: usize,
    /// Replies sent (including those whose mark-read failed).
    pub replied: usize,
    pub unmatched: usize,
    /// Matched but deliberately not sent (dry run, missing recipient).
    pub skipped: usize,
    /// Extraction, fetch, send or mark-read failures.
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Replied { .. } => self.replied += 1,
            MessageOutcome::NoMatch => self.unmatched += 1,
            MessageOutcome::DryRun { .. } | MessageOutcome::MissingRecipient => self.skipped += 1,
            MessageOutcome::MarkReadFailed { .. } => {
                self.replied += 1;
                self.failed += 1;
            }
            MessageOutcome::ExtractionFailed { .. }
            | MessageOutcome::FetchFailed { .. }
            | MessageOutcome::SendFailed { .. } => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::*;

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text.as_bytes())
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = RawMessage {
            id: "m1".into(),
            headers: vec![
                MessageHeader::new("subject", "Where is my order?"),
                MessageHeader::new("TO", "support@shop.test"),
            ],
            body_parts: vec![],
        };
        assert_eq!(msg.subject(), "Where is my order?");
        assert_eq!(msg.reply_address(), Some("support@shop.test"));
    }

    #[test]
    fn missing_subject_is_empty() {
        let msg = RawMessage::default();
        assert_eq!(msg.subject(), "");
        assert_eq!(msg.reply_address(), None);
    }

    #[test]
    fn blank_to_header_is_no_recipient() {
        let msg = RawMessage {
            headers: vec![MessageHeader::new("To", "   ")],
            ..Default::default()
        };
        assert_eq!(msg.reply_address(), None);
    }

    #[test]
    fn body_decodes_base64url() {
        let msg = RawMessage {
            body_parts: vec![BodyPart::base64url("text/plain", encode("Has my order shipped?"))],
            ..Default::default()
        };
        assert_eq!(msg.body_text(), "Has my order shipped?");
    }

    #[test]
    fn body_accepts_padded_base64url() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("ab");
        assert!(padded.ends_with('='));
        let part = BodyPart::base64url("text/plain", padded);
        assert_eq!(part.decode().as_deref(), Some("ab"));
    }

    #[test]
    fn undecodable_part_is_skipped() {
        let msg = RawMessage {
            body_parts: vec![
                BodyPart::base64url("text/plain", "!!not base64!!"),
                BodyPart::text("text/plain", "fallback body"),
            ],
            ..Default::default()
        };
        assert_eq!(msg.body_text(), "fallback body");
    }

    #[test]
    fn no_body_parts_is_empty_body() {
        assert_eq!(RawMessage::default().body_text(), "");
    }

    #[test]
    fn html_part_is_stripped() {
        let part = BodyPart::text("text/html", "<p>Package <b>delayed</b></p>");
        assert_eq!(part.decode().as_deref(), Some("Package delayed"));
    }

    #[test]
    fn match_text_joins_subject_and_body_with_space() {
        let msg = RawMessage {
            headers: vec![MessageHeader::new("Subject", "Tracking")],
            body_parts: vec![BodyPart::text("text/plain", "not updated")],
            ..Default::default()
        };
        assert_eq!(msg.match_text(), "Tracking not updated");
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(&MessageOutcome::NoMatch);
        summary.record(&MessageOutcome::MissingRecipient);
        summary.record(&MessageOutcome::SendFailed {
            reason: "rejected".into(),
        });
        summary.record(&MessageOutcome::MarkReadFailed {
            reason: "timeout".into(),
        });
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.replied, 1);
        assert_eq!(summary.failed, 2);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(MessageOutcome::NoMatch.label(), "no_match");
        assert_eq!(MessageOutcome::MissingRecipient.label(), "missing_recipient");
        assert_eq!(
            MessageOutcome::DryRun {
                template: 0,
                score: 1.0
            }
            .label(),
            "dry_run"
        );
    }

    // ── HTML stripping tests ────────────────────────────────────────

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_block_tags_separate_words() {
        assert_eq!(strip_html("<p>order</p><p>shipped</p>"), "order shipped");
    }

    #[test]
    fn strip_html_with_attributes() {
        assert_eq!(
            strip_html(r#"<a href="https://example.com">Link</a>"#),
            "Link"
        );
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    #[test]
    fn strip_html_empty() {
        assert_eq!(strip_html(""), "");
    }
}
