//! Inbox auto-responder: keyword-matched canned replies to unread mail.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
