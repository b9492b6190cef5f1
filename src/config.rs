//! Configuration types.
//!
//! Everything is read from environment variables. `from_env` delegates to a
//! `from_lookup` taking any key → value function so tests never touch the
//! process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::gmail::GMAIL_API_BASE;
use crate::error::ConfigError;
use crate::pipeline::keywords::KeywordCase;

/// Default OAuth token file for the Gmail backend.
pub const DEFAULT_TOKEN_PATH: &str = "./token.json";

/// Which mailbox gateway to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatewayBackend {
    #[default]
    Gmail,
    Imap,
}

impl FromStr for GatewayBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" => Ok(Self::Gmail),
            "imap" => Ok(Self::Imap),
            other => Err(format!("expected \"gmail\" or \"imap\", got {other:?}")),
        }
    }
}

impl GatewayBackend {
    /// Mailbox owner when `AUTOREPLY_USER_ID` is unset.
    pub fn default_user_id(self) -> &'static str {
        match self {
            Self::Gmail => "me",
            Self::Imap => "INBOX",
        }
    }
}

/// Auto-responder run configuration.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub backend: GatewayBackend,
    /// Gmail user id, or IMAP mailbox name.
    pub user_id: String,
    /// TOML catalog; `None` means the built-in templates.
    pub templates_path: Option<PathBuf>,
    pub keyword_case: KeywordCase,
    pub dry_run: bool,
    /// `None` runs once and exits.
    pub poll_interval: Option<Duration>,
    /// Directory for a daily-rotated log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl ResponderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend: GatewayBackend =
            parse_var(&lookup, "AUTOREPLY_BACKEND")?.unwrap_or_default();

        let user_id = non_empty(&lookup, "AUTOREPLY_USER_ID")
            .unwrap_or_else(|| backend.default_user_id().to_string());

        let case_insensitive = parse_flag(&lookup, "AUTOREPLY_CASE_INSENSITIVE")?;

        let poll_interval = match parse_var::<u64>(&lookup, "AUTOREPLY_POLL_INTERVAL_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "AUTOREPLY_POLL_INTERVAL_SECS".into(),
                    message: "interval must be at least 1 second".into(),
                });
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Self {
            backend,
            user_id,
            templates_path: non_empty(&lookup, "AUTOREPLY_TEMPLATES_PATH").map(PathBuf::from),
            keyword_case: KeywordCase::from_flag(case_insensitive),
            dry_run: parse_flag(&lookup, "AUTOREPLY_DRY_RUN")?,
            poll_interval,
            log_dir: non_empty(&lookup, "AUTOREPLY_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// How the Gmail gateway obtains its bearer token.
#[derive(Debug, Clone)]
pub enum GmailAuthConfig {
    /// A fixed access token; never refreshed.
    Static(SecretString),
    /// Token file plus OAuth client credentials for refresh.
    OAuth {
        token_path: PathBuf,
        client_id: String,
        client_secret: SecretString,
    },
}

/// Gmail backend configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    /// From address for replies; looked up from the profile when unset.
    pub from_address: Option<String>,
    pub auth: GmailAuthConfig,
}

impl GmailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `GMAIL_ACCESS_TOKEN` wins; otherwise OAuth client credentials are required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let auth = match non_empty(&lookup, "GMAIL_ACCESS_TOKEN") {
            Some(token) => GmailAuthConfig::Static(SecretString::from(token)),
            None => GmailAuthConfig::OAuth {
                token_path: non_empty(&lookup, "GMAIL_TOKEN_PATH")
                    .unwrap_or_else(|| DEFAULT_TOKEN_PATH.to_string())
                    .into(),
                client_id: required(&lookup, "GMAIL_CLIENT_ID", OAUTH_HINT)?,
                client_secret: SecretString::from(required(
                    &lookup,
                    "GMAIL_CLIENT_SECRET",
                    OAUTH_HINT,
                )?),
            },
        };

        Ok(Self {
            api_base: non_empty(&lookup, "GMAIL_API_BASE")
                .unwrap_or_else(|| GMAIL_API_BASE.to_string()),
            from_address: non_empty(&lookup, "GMAIL_FROM_ADDRESS"),
            auth,
        })
    }
}

const OAUTH_HINT: &str = "Set GMAIL_ACCESS_TOKEN, or GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET with a token file at GMAIL_TOKEN_PATH";

// ── Lookup helpers ──────────────────────────────────────────────────

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    hint: &str,
) -> Result<String, ConfigError> {
    non_empty(lookup, key).ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(lookup, key)
        .map(|v| {
            v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Accepts `1/0`, `true/false`, `yes/no`, `on/off`. Unset is `false`.
fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    let Some(value) = non_empty(lookup, key) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {value:?}"),
        }),
    }
}
