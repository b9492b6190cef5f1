//! Error types for the auto-responder.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Keyword extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Template catalog load errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Template #{index} has no required keywords")]
    EmptyKeywords { index: usize },

    #[error("Template #{index} contains a blank keyword")]
    BlankKeyword { index: usize },

    #[error("Template #{index} keyword {keyword:?} contains whitespace")]
    InvalidKeyword { index: usize, keyword: String },

    #[error("Template #{index} has an empty response text")]
    EmptyResponse { index: usize },

    #[error("Template #{index} duplicates the keyword set of template #{first}: {keywords:?}")]
    DuplicateKeywords {
        index: usize,
        first: usize,
        keywords: Vec<String>,
    },

    #[error("Template catalog is empty")]
    Empty,

    #[error("Failed to read template file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse template file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Keyword extraction errors. Fatal for the current message only.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Tagger {tagger} unavailable: {reason}")]
    TaggerUnavailable { tagger: String, reason: String },
}

/// Mailbox gateway errors (list / get / send / mark-read).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{gateway} API returned {status}: {message}")]
    Api {
        gateway: String,
        status: u16,
        message: String,
    },

    #[error("Access token expired or was rejected by {gateway}")]
    AuthExpired { gateway: String },

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Invalid message id: {0:?}")]
    InvalidMessageId(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Failed to send reply: {reason}")]
    SendFailed { reason: String },

    #[error("Malformed message {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Gateway task failed: {0}")]
    Task(String),
}

/// Authentication provider errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Re-authorization required: {reason}")]
    ReauthorizationRequired { reason: String },

    #[error("Token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    #[error("Token store {path}: {reason}")]
    Store { path: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the auto-responder.
pub type Result<T> = std::result::Result<T, Error>;
