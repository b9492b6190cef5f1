//! Auto-reply pipeline.
//!
//! Every unread message flows through:
//! 1. `MailboxGateway::get_message()`: provider-specific I/O
//! 2. `KeywordExtractor::extract_keywords()`: content words of subject + body
//! 3. `find_best_template()`: highest-overlap canned response, if any clears the threshold
//! 4. `MailboxGateway::send_reply()` then `mark_read()`
//!
//! Messages that get no reply are left unread.

pub mod keywords;
pub mod matcher;
pub mod poller;
pub mod processor;
pub mod tagger;
pub mod templates;
pub mod types;

pub use keywords::{KeywordCase, KeywordExtractor};
pub use matcher::{Score, TemplateMatch, find_best_template};
pub use processor::AutoResponder;
pub use templates::{Template, TemplateCatalog, load_templates};
pub use types::{MailboxGateway, MessageOutcome, RawMessage, RunSummary};
