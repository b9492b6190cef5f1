//! End-to-end tests for the auto-responder.
//!
//! Each test builds an `AutoResponder` over an in-memory mailbox that
//! stores Gmail-shaped messages (headers + base64url body parts) and
//! records every reply and mark-read call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use inbox_autoreply::error::{CatalogError, GatewayError};
use inbox_autoreply::pipeline::types::{BodyPart, DeliveryReceipt, MessageHeader};
use inbox_autoreply::pipeline::{
    AutoResponder, KeywordCase, KeywordExtractor, MailboxGateway, MessageOutcome, RawMessage,
    TemplateCatalog, load_templates,
};

/// A sent reply as seen by the mailbox.
#[derive(Debug, Clone, PartialEq)]
struct SentReply {
    to: String,
    subject: String,
    body: String,
}

/// In-memory mailbox. `mark_read` removes a message from the unread set.
#[derive(Default)]
struct StubMailbox {
    messages: BTreeMap<String, RawMessage>,
    unread: Mutex<BTreeSet<String>>,
    sent: Mutex<Vec<SentReply>>,
}

impl StubMailbox {
    fn deliver(&mut self, id: &str, to: Option<&str>, subject: Option<&str>, body: &str) {
        let mut headers = vec![MessageHeader::new("From", "customer@example.com")];
        if let Some(to) = to {
            headers.push(MessageHeader::new("To", to));
        }
        if let Some(subject) = subject {
            headers.push(MessageHeader::new("Subject", subject));
        }
        let body_parts = if body.is_empty() {
            Vec::new()
        } else {
            vec![BodyPart::base64url("text/plain", URL_SAFE_NO_PAD.encode(body))]
        };

        self.messages.insert(
            id.to_string(),
            RawMessage {
                id: id.to_string(),
                headers,
                body_parts,
            },
        );
        self.unread.lock().unwrap().insert(id.to_string());
    }

    fn is_unread(&self, id: &str) -> bool {
        self.unread.lock().unwrap().contains(id)
    }

    fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxGateway for StubMailbox {
    fn name(&self) -> &str {
        "stub"
    }

    async fn list_unread(&self, _user_id: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self.unread.lock().unwrap().iter().cloned().collect())
    }

    async fn get_message(
        &self,
        _user_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, GatewayError> {
        self.messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                id: message_id.to_string(),
            })
    }

    async fn send_reply(
        &self,
        _user_id: &str,
        to_address: &str,
        subject: &str,
        body_text: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentReply {
            to: to_address.to_string(),
            subject: subject.to_string(),
            body: body_text.to_string(),
        });
        Ok(DeliveryReceipt {
            id: format!("reply-{}", sent.len()),
        })
    }

    async fn mark_read(&self, _user_id: &str, message_id: &str) -> Result<(), GatewayError> {
        self.unread.lock().unwrap().remove(message_id);
        Ok(())
    }
}

fn builtin_responder(mailbox: Arc<StubMailbox>) -> (AutoResponder, Arc<TemplateCatalog>) {
    let catalog = Arc::new(TemplateCatalog::builtin(KeywordCase::Preserve).unwrap());
    let responder = AutoResponder::new(
        mailbox,
        KeywordExtractor::lexicon(),
        Arc::clone(&catalog),
        "me",
    );
    (responder, catalog)
}

#[tokio::test]
async fn tracking_question_gets_tracking_reply() {
    let mut mailbox = StubMailbox::default();
    mailbox.deliver(
        "m1",
        Some("support@shop.test"),
        Some("Where is my tracking number?"),
        "",
    );
    let mailbox = Arc::new(mailbox);
    let (responder, catalog) = builtin_responder(Arc::clone(&mailbox));

    let summary = responder.run_once().await.unwrap();

    assert_eq!(summary.replied, 1);
    assert_eq!(
        mailbox.sent(),
        vec![SentReply {
            to: "support@shop.test".into(),
            subject: "Re: Where is my tracking number?".into(),
            body: catalog.get(7).unwrap().response_text().into(),
        }]
    );
    assert!(!mailbox.is_unread("m1"));
}

#[tokio::test]
async fn body_text_contributes_keywords() {
    let mut mailbox = StubMailbox::default();
    mailbox.deliver(
        "m1",
        Some("support@shop.test"),
        Some("Question"),
        "Hi, has my order shipped yet?",
    );
    let mailbox = Arc::new(mailbox);
    let (responder, catalog) = builtin_responder(Arc::clone(&mailbox));

    let outcome = responder.process_message("m1").await;

    assert!(matches!(outcome, MessageOutcome::Replied { template: 3, .. }));
    assert_eq!(mailbox.sent()[0].body, catalog.get(3).unwrap().response_text());
}

#[tokio::test]
async fn empty_message_gets_no_reply_and_stays_unread() {
    let mut mailbox = StubMailbox::default();
    mailbox.deliver("m1", Some("support@shop.test"), None, "");
    let mailbox = Arc::new(mailbox);
    let (responder, _) = builtin_responder(Arc::clone(&mailbox));

    let summary = responder.run_once().await.unwrap();

    assert_eq!(summary.unmatched, 1);
    assert!(mailbox.sent().is_empty());
    assert!(mailbox.is_unread("m1"));
}

#[tokio::test]
async fn replied_messages_are_not_answered_twice() {
    let mut mailbox = StubMailbox::default();
    mailbox.deliver("m1", Some("support@shop.test"), Some("tracking"), "");
    mailbox.deliver("m2", Some("support@shop.test"), Some("Thanks!"), "");
    let mailbox = Arc::new(mailbox);
    let (responder, _) = builtin_responder(Arc::clone(&mailbox));

    let first = responder.run_once().await.unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.replied, 1);
    assert_eq!(first.unmatched, 1);

    let second = responder.run_once().await.unwrap();
    assert_eq!(second.total, 1);
    assert_eq!(second.replied, 0);
    assert_eq!(mailbox.sent().len(), 1);
    assert!(mailbox.is_unread("m2"));
}

#[tokio::test]
async fn custom_catalog_with_case_folding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.toml");
    std::fs::write(
        &path,
        r#"
[[template]]
keywords = ["Invoice", "missing"]
response = "We have re-sent your invoice."

[[template]]
keywords = ["cancel", "subscription"]
response = "Your subscription has been cancelled."
"#,
    )
    .unwrap();

    let catalog = Arc::new(load_templates(Some(&path), KeywordCase::Fold).unwrap());

    let mut mailbox = StubMailbox::default();
    mailbox.deliver(
        "m1",
        Some("billing@shop.test"),
        Some("INVOICE MISSING"),
        "I never got it.",
    );
    let mailbox = Arc::new(mailbox);
    let responder = AutoResponder::new(
        Arc::clone(&mailbox) as Arc<dyn MailboxGateway>,
        KeywordExtractor::lexicon().with_case(KeywordCase::Fold),
        catalog,
        "me",
    );

    let summary = responder.run_once().await.unwrap();

    assert_eq!(summary.replied, 1);
    assert_eq!(mailbox.sent()[0].body, "We have re-sent your invoice.");
}

#[tokio::test]
async fn dry_run_leaves_mailbox_untouched() {
    let mut mailbox = StubMailbox::default();
    mailbox.deliver("m1", Some("support@shop.test"), Some("tracking"), "");
    let mailbox = Arc::new(mailbox);
    let (responder, _) = builtin_responder(Arc::clone(&mailbox));
    let responder = responder.with_dry_run(true);

    let summary = responder.run_once().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert!(mailbox.sent().is_empty());
    assert!(mailbox.is_unread("m1"));
}

#[test]
fn duplicate_keyword_sets_fail_catalog_load() {
    let err = TemplateCatalog::from_toml_str(
        r#"
[[template]]
keywords = ["order", "shipped"]
response = "a"

[[template]]
keywords = ["shipped", "order"]
response = "b"
"#,
        "inline",
        KeywordCase::Preserve,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::DuplicateKeywords { index: 1, first: 0, .. }
    ));
}
