//! IMAP + SMTP mailbox gateway.
//!
//! Inbound: raw IMAP over rustls, one short session per gateway call.
//! Messages are fetched with `BODY.PEEK[]` so reading never sets `\Seen`;
//! only [`MailboxGateway::mark_read`] does. Outbound: SMTP via lettre.

use std::io::{Read, Write as IoWrite};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailboxes;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::pipeline::types::{
    BodyPart, DeliveryReceipt, MailboxGateway, MessageHeader, RawMessage,
};

/// Default mailbox when `user_id` is empty.
const DEFAULT_MAILBOX: &str = "INBOX";

/// Socket read timeout for IMAP sessions.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// IMAP/SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_IMAP_HOST` is not set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let imap_host = lookup("EMAIL_IMAP_HOST")?;

        let imap_port: u16 = lookup("EMAIL_IMAP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            lookup("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = lookup("EMAIL_SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = lookup("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = lookup("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Mailbox gateway over IMAP (read side) and SMTP (reply side).
///
/// `user_id` selects the IMAP mailbox; message ids are IMAP UIDs.
pub struct ImapGateway {
    config: Arc<EmailConfig>,
}

impl ImapGateway {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run a blocking IMAP session on the blocking pool.
    async fn with_session<T, F>(&self, mailbox: &str, f: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, GatewayError> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let mailbox = mailbox_name(mailbox).to_string();
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::connect(&config)?;
            session.select(&mailbox)?;
            let result = f(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| GatewayError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MailboxGateway for ImapGateway {
    fn name(&self) -> &str {
        "imap"
    }

    async fn list_unread(&self, user_id: &str) -> Result<Vec<String>, GatewayError> {
        let uids = self
            .with_session(user_id, |session| session.search_unseen())
            .await?;
        debug!(count = uids.len(), "IMAP unseen messages");
        Ok(uids)
    }

    async fn get_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, GatewayError> {
        let uid = validate_uid(message_id)?;
        let id = message_id.to_string();
        let raw = self
            .with_session(user_id, move |session| session.fetch_peek(&uid))
            .await?;
        parse_raw_message(&id, &raw)
    }

    async fn send_reply(
        &self,
        _user_id: &str,
        to_address: &str,
        subject: &str,
        body_text: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        let email = build_reply_message(&self.config.from_address, to_address, subject, body_text)?;
        let config = Arc::clone(&self.config);
        let to = to_address.to_string();

        tokio::task::spawn_blocking(move || send_smtp(&config, &to, email))
            .await
            .map_err(|e| GatewayError::Task(e.to_string()))?
    }

    async fn mark_read(&self, user_id: &str, message_id: &str) -> Result<(), GatewayError> {
        let uid = validate_uid(message_id)?;
        self.with_session(user_id, move |session| session.mark_seen(&uid))
            .await
    }
}

/// Send a built message over SMTP (blocking; run in spawn_blocking).
fn send_smtp(
    config: &EmailConfig,
    to: &str,
    email: Message,
) -> Result<DeliveryReceipt, GatewayError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| GatewayError::SendFailed {
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    let id = email
        .headers()
        .get_raw("Message-ID")
        .map(str::to_string)
        .unwrap_or_default();

    let response = transport.send(&email).map_err(|e| GatewayError::SendFailed {
        reason: format!("SMTP send failed: {e}"),
    })?;

    info!(to = %to, code = %response.code(), "Reply sent via SMTP");
    Ok(DeliveryReceipt { id })
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Build a plain-text reply with a fresh Message-ID.
///
/// `to` is a header value and may list several comma-separated addresses;
/// each one becomes a recipient.
pub fn build_reply_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<Message, GatewayError> {
    let recipients: Mailboxes = to.parse().map_err(|e| GatewayError::SendFailed {
        reason: format!("Invalid to address: {e}"),
    })?;
    if recipients.iter().next().is_none() {
        return Err(GatewayError::SendFailed {
            reason: "No recipient address".into(),
        });
    }

    let mut builder = Message::builder();
    for mailbox in recipients {
        builder = builder.to(mailbox);
    }

    builder
        .from(from.parse().map_err(|e| GatewayError::SendFailed {
            reason: format!("Invalid from address: {e}"),
        })?)
        .subject(subject)
        .message_id(Some(format!("<{}@inbox-autoreply>", Uuid::new_v4())))
        .body(body.to_string())
        .map_err(|e| GatewayError::SendFailed {
            reason: format!("Failed to build email: {e}"),
        })
}

/// Parse an RFC 822 message into the gateway's header/body-part form.
pub fn parse_raw_message(id: &str, raw: &[u8]) -> Result<RawMessage, GatewayError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| GatewayError::Malformed {
            id: id.to_string(),
            reason: "not an RFC 822 message".into(),
        })?;

    let mut headers = Vec::new();
    if let Some(to) = first_address(parsed.to()) {
        headers.push(MessageHeader::new("To", to));
    }
    if let Some(from) = first_address(parsed.from()) {
        headers.push(MessageHeader::new("From", from));
    }
    if let Some(subject) = parsed.subject() {
        headers.push(MessageHeader::new("Subject", subject));
    }

    let mut body_parts = Vec::new();
    if let Some(text) = parsed.body_text(0) {
        body_parts.push(BodyPart::text("text/plain", text.into_owned()));
    }
    if let Some(html) = parsed.body_html(0) {
        body_parts.push(BodyPart::text("text/html", html.into_owned()));
    }

    Ok(RawMessage {
        id: id.to_string(),
        headers,
        body_parts,
    })
}

fn first_address(address: Option<&mail_parser::Address>) -> Option<String> {
    address
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
}

fn mailbox_name(user_id: &str) -> &str {
    if user_id.is_empty() || user_id == "me" {
        DEFAULT_MAILBOX
    } else {
        user_id
    }
}

/// UIDs are positive integers; anything else could smuggle IMAP syntax.
fn validate_uid(message_id: &str) -> Result<String, GatewayError> {
    if !message_id.is_empty() && message_id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(message_id.to_string())
    } else {
        Err(GatewayError::InvalidMessageId(message_id.to_string()))
    }
}

/// Byte length of a trailing IMAP literal marker, e.g. `... BODY[] {1234}`.
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let open = trimmed.rfind('{')?;
    trimmed.strip_suffix('}')?[open + 1..].parse().ok()
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// A logged-in IMAP connection (blocking).
struct ImapSession {
    tls: TlsStream,
    tag_counter: u32,
}

impl ImapSession {
    fn connect(config: &EmailConfig) -> Result<Self, GatewayError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(imap_io)?;
        tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT))
            .map_err(imap_io)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| GatewayError::Imap(format!("invalid IMAP host: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| GatewayError::Imap(format!("TLS setup failed: {e}")))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            tag_counter: 1,
        };

        let _greeting = session.read_line()?;

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        session
            .command(&login)
            .map_err(|_| GatewayError::Imap("IMAP login failed".into()))?;

        Ok(session)
    }

    fn select(&mut self, mailbox: &str) -> Result<(), GatewayError> {
        self.command(&format!("SELECT {}", quote(mailbox)))?;
        Ok(())
    }

    fn search_unseen(&mut self) -> Result<Vec<String>, GatewayError> {
        let lines = self.command("UID SEARCH UNSEEN")?;
        let mut uids = Vec::new();
        for line in &lines {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                uids.extend(rest.split_whitespace().map(str::to_string));
            }
        }
        Ok(uids)
    }

    /// Fetch the full message without setting `\Seen`.
    fn fetch_peek(&mut self, uid: &str) -> Result<Vec<u8>, GatewayError> {
        let tag = self.send(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        let mut body = None;

        loop {
            let line = self.read_line()?;
            if is_tagged(&line, &tag) {
                check_status(&tag, &line)?;
                break;
            }
            if let Some(len) = literal_len(&line) {
                let mut buf = vec![0u8; len];
                self.tls.read_exact(&mut buf).map_err(imap_io)?;
                body = Some(buf);
            }
        }

        body.ok_or_else(|| GatewayError::NotFound {
            id: uid.to_string(),
        })
    }

    fn mark_seen(&mut self, uid: &str) -> Result<(), GatewayError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }

    /// Send a tagged command and collect untagged lines until its completion.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, GatewayError> {
        let tag = self.send(cmd)?;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            if is_tagged(&line, &tag) {
                check_status(&tag, &line)?;
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    fn send(&mut self, cmd: &str) -> Result<String, GatewayError> {
        let tag = format!("A{}", self.tag_counter);
        self.tag_counter += 1;
        let full = format!("{tag} {cmd}\r\n");
        IoWrite::write_all(&mut self.tls, full.as_bytes()).map_err(imap_io)?;
        IoWrite::flush(&mut self.tls).map_err(imap_io)?;
        Ok(tag)
    }

    fn read_line(&mut self) -> Result<String, GatewayError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(GatewayError::Imap("IMAP connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(imap_io(e)),
            }
        }
    }
}

fn is_tagged(line: &str, tag: &str) -> bool {
    line.strip_prefix(tag).is_some_and(|rest| rest.starts_with(' '))
}

fn check_status(tag: &str, line: &str) -> Result<(), GatewayError> {
    let status = line[tag.len()..].trim_start();
    if status.starts_with("OK") {
        Ok(())
    } else {
        Err(GatewayError::Imap(format!("command failed: {}", status.trim_end())))
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn imap_io(e: std::io::Error) -> GatewayError {
    GatewayError::Imap(e.to_string())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "From: Customer <customer@example.com>\r\n\
To: support@shop.test\r\n\
Subject: Package delayed\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
My package is delayed again.\r\n";

    // ── Message parsing tests ───────────────────────────────────────

    #[test]
    fn parse_raw_message_extracts_headers_and_body() {
        let msg = parse_raw_message("42", SAMPLE.as_bytes()).unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.reply_address(), Some("support@shop.test"));
        assert_eq!(msg.header("From"), Some("customer@example.com"));
        assert_eq!(msg.subject(), "Package delayed");
        assert!(msg.body_text().contains("My package is delayed again."));
    }

    #[test]
    fn parse_raw_message_without_subject() {
        let raw = "To: support@shop.test\r\n\r\nhello\r\n";
        let msg = parse_raw_message("7", raw.as_bytes()).unwrap();
        assert_eq!(msg.subject(), "");
    }

    // ── IMAP protocol helpers ───────────────────────────────────────

    #[test]
    fn literal_len_parses_marker() {
        assert_eq!(literal_len("* 1 FETCH (UID 5 BODY[] {1234}\r\n"), Some(1234));
        assert_eq!(literal_len("* 1 FETCH (UID 5 FLAGS (\\Seen))\r\n"), None);
    }

    #[test]
    fn tagged_line_requires_exact_tag() {
        assert!(is_tagged("A1 OK done\r\n", "A1"));
        assert!(!is_tagged("A10 OK done\r\n", "A1"));
        assert!(!is_tagged("* SEARCH 1 2\r\n", "A1"));
    }

    #[test]
    fn check_status_ok_and_no() {
        assert!(check_status("A3", "A3 OK SEARCH completed\r\n").is_ok());
        assert!(check_status("A3", "A3 NO mailbox not found\r\n").is_err());
        assert!(check_status("A3", "A3 BAD syntax\r\n").is_err());
    }

    #[test]
    fn uid_validation_rejects_imap_syntax() {
        assert!(validate_uid("123").is_ok());
        assert!(validate_uid("").is_err());
        assert!(validate_uid("1:*").is_err());
        assert!(validate_uid("1 +FLAGS").is_err());
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn mailbox_defaults_to_inbox() {
        assert_eq!(mailbox_name("me"), "INBOX");
        assert_eq!(mailbox_name(""), "INBOX");
        assert_eq!(mailbox_name("Support"), "Support");
    }

    // ── Reply construction ──────────────────────────────────────────

    #[test]
    fn reply_message_has_subject_and_message_id() {
        let email = build_reply_message(
            "support@shop.test",
            "customer@example.com",
            "Re: Package delayed",
            "We apologize for the delay.",
        )
        .unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();
        assert!(formatted.contains("Subject: Re: Package delayed"));
        assert!(formatted.contains("Message-ID: <"));
        assert!(formatted.contains("We apologize for the delay."));
    }

    #[test]
    fn reply_message_accepts_several_recipients() {
        let email = build_reply_message(
            "support@shop.test",
            "support@shop.test, Orders <orders@shop.test>",
            "Re: Order",
            "Thanks.",
        )
        .unwrap();
        let recipients: Vec<String> = email.envelope().to().iter().map(|a| a.to_string()).collect();
        assert_eq!(recipients, vec!["support@shop.test", "orders@shop.test"]);
    }

    #[test]
    fn reply_message_rejects_bad_recipient() {
        let err = build_reply_message("support@shop.test", "not an address", "Re: x", "y")
            .unwrap_err();
        assert!(matches!(err, GatewayError::SendFailed { .. }));
    }

    // ── Config tests ────────────────────────────────────────────────

    #[test]
    fn config_none_without_imap_host() {
        assert!(EmailConfig::from_lookup(|_| None).is_none());
    }

    #[test]
    fn config_defaults() {
        let config = EmailConfig::from_lookup(|key| match key {
            "EMAIL_IMAP_HOST" => Some("imap.shop.test".into()),
            "EMAIL_USERNAME" => Some("support@shop.test".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_host, "smtp.shop.test");
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.from_address, "support@shop.test");
    }

    #[test]
    fn gateway_name() {
        let config = EmailConfig::from_lookup(|key| {
            (key == "EMAIL_IMAP_HOST").then(|| "imap.test.com".to_string())
        })
        .unwrap();
        assert_eq!(ImapGateway::new(config).name(), "imap");
    }
}
