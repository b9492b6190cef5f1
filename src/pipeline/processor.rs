//! Auto-responder: one pass over the unread snapshot.
//!
//! Per message: fetch → keyword extraction → template matching → reply →
//! mark read. A message that gets no reply stays unread. A message is only
//! marked read after its reply was accepted.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{ExtractionError, GatewayError};
use crate::pipeline::keywords::KeywordExtractor;
use crate::pipeline::matcher::{TemplateMatch, find_best_template};
use crate::pipeline::templates::TemplateCatalog;
use crate::pipeline::types::{MailboxGateway, MessageOutcome, RawMessage, RunSummary};

/// Subject line for a reply.
pub fn reply_subject(subject: &str) -> String {
    format!("Re: {subject}")
}

/// Orchestrates gateway, extractor and catalog.
///
/// Holds no per-run state; `run_once` may be called repeatedly.
pub struct AutoResponder {
    gateway: Arc<dyn MailboxGateway>,
    extractor: KeywordExtractor,
    catalog: Arc<TemplateCatalog>,
    user_id: String,
    dry_run: bool,
}

impl AutoResponder {
    pub fn new(
        gateway: Arc<dyn MailboxGateway>,
        extractor: KeywordExtractor,
        catalog: Arc<TemplateCatalog>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            extractor,
            catalog,
            user_id: user_id.into(),
            dry_run: false,
        }
    }

    /// Match and log, but never send or mark read.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Process every message that is unread at the start of the run.
    ///
    /// Fails only if the unread listing itself fails; per-message failures
    /// are logged, counted and never stop the run.
    pub async fn run_once(&self) -> Result<RunSummary, GatewayError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("autoreply_run", %run_id, gateway = self.gateway.name());

        async {
            let ids = self.gateway.list_unread(&self.user_id).await.map_err(|e| {
                error!(error = %e, "Failed to list unread messages");
                e
            })?;

            let mut summary = RunSummary {
                total: ids.len(),
                ..Default::default()
            };

            if ids.is_empty() {
                debug!("No unread messages");
                return Ok(summary);
            }

            info!(count = ids.len(), "Processing unread messages");

            for id in &ids {
                let outcome = self.process_message(id).await;
                summary.record(&outcome);
            }

            info!(
                total = summary.total,
                replied = summary.replied,
                unmatched = summary.unmatched,
                skipped = summary.skipped,
                failed = summary.failed,
                "Run complete"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Handle one message end to end. Never fails; the outcome says what happened.
    pub async fn process_message(&self, message_id: &str) -> MessageOutcome {
        let outcome = self.handle(message_id).await;
        match &outcome {
            MessageOutcome::Replied { .. } | MessageOutcome::DryRun { .. } => {
                info!(id = %message_id, outcome = outcome.label(), "Message handled")
            }
            MessageOutcome::NoMatch => {
                debug!(id = %message_id, "No template matched; leaving unread")
            }
            MessageOutcome::MissingRecipient => {
                warn!(id = %message_id, "Matched but message has no To address; leaving unread")
            }
            _ => warn!(id = %message_id, outcome = outcome.label(), "Message not handled"),
        }
        outcome
    }

    async fn handle(&self, message_id: &str) -> MessageOutcome {
        let message = match self.gateway.get_message(&self.user_id, message_id).await {
            Ok(m) => m,
            Err(e) => {
                return MessageOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        let selected = match self.select_template(&message) {
            Ok(Some(m)) => m,
            Ok(None) => return MessageOutcome::NoMatch,
            Err(e) => {
                return MessageOutcome::ExtractionFailed {
                    reason: e.to_string(),
                };
            }
        };

        let template = selected.index;
        let score = selected.score.as_f64();

        if self.dry_run {
            info!(
                id = %message_id,
                template,
                score,
                "Dry run: reply not sent"
            );
            return MessageOutcome::DryRun { template, score };
        }

        let Some(to_address) = message.reply_address() else {
            return MessageOutcome::MissingRecipient;
        };

        let receipt = match self
            .gateway
            .send_reply(
                &self.user_id,
                to_address,
                &reply_subject(message.subject()),
                selected.response_text(),
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(id = %message_id, error = %e, "Failed to send reply");
                return MessageOutcome::SendFailed {
                    reason: e.to_string(),
                };
            }
        };

        if let Err(e) = self.gateway.mark_read(&self.user_id, message_id).await {
            error!(id = %message_id, error = %e, "Reply sent but mark-read failed");
            return MessageOutcome::MarkReadFailed {
                reason: e.to_string(),
            };
        }

        MessageOutcome::Replied {
            template,
            score,
            receipt,
        }
    }

    /// The matching decision for one message, without any I/O.
    pub fn select_template<'a>(
        &'a self,
        message: &RawMessage,
    ) -> Result<Option<TemplateMatch<'a>>, ExtractionError> {
        let keywords = self.extractor.extract_keywords(&message.match_text())?;
        debug!(id = %message.id, keywords = ?keywords, "Message keywords");
        Ok(find_best_template(&keywords, self.catalog.templates()))
    }
}
