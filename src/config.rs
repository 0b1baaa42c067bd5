//! Configuration types, built from environment variables.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Anthropic messages endpoint.
pub const DEFAULT_EXTRACTION_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Default extraction model.
pub const DEFAULT_EXTRACTION_MODEL: &str = "claude-sonnet-4-20250514";

/// Mailbox connection and search settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Folder selected after login.
    pub mailbox: String,
    /// Only messages from this address are searched. Empty disables the predicate.
    pub sender_filter: String,
    /// Search lower bound, in days before now.
    pub lookback_days: u32,
    /// Subject keywords, OR-ed together in the search.
    pub subject_keywords: Vec<String>,
    pub unseen_only: bool,
    /// Flag fetched messages `\Seen` once their drafts were handed off.
    pub mark_seen: bool,
    pub poll_interval_secs: u64,
    pub read_timeout: Duration,
}

impl MailboxConfig {
    /// Build config from environment variables.
    ///
    /// `INTAKE_IMAP_HOST` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = require("INTAKE_IMAP_HOST")?;
        let username = std::env::var("INTAKE_IMAP_USERNAME").unwrap_or_default();
        let password = std::env::var("INTAKE_IMAP_PASSWORD").unwrap_or_default();

        let subject_keywords = split_list(
            &std::env::var("INTAKE_SUBJECT_KEYWORDS")
                .unwrap_or_else(|_| "Work Order,Dispatch".to_string()),
        );

        Ok(Self {
            host,
            port: parse_or("INTAKE_IMAP_PORT", 993)?,
            username,
            password: SecretString::from(password),
            mailbox: std::env::var("INTAKE_IMAP_MAILBOX").unwrap_or_else(|_| "INBOX".to_string()),
            sender_filter: std::env::var("INTAKE_SENDER_FILTER").unwrap_or_default(),
            lookback_days: parse_or("INTAKE_LOOKBACK_DAYS", 7)?,
            subject_keywords,
            unseen_only: parse_or("INTAKE_UNSEEN_ONLY", true)?,
            mark_seen: parse_or("INTAKE_MARK_SEEN", false)?,
            poll_interval_secs: parse_or("INTAKE_POLL_INTERVAL_SECS", 600)?,
            read_timeout: Duration::from_secs(parse_or("INTAKE_READ_TIMEOUT_SECS", 30)?),
        })
    }
}

/// External extraction model settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub endpoint: String,
    /// Per-call deadline applied by the invoice extractor.
    pub timeout: Duration,
}

impl ExtractionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = require("ANTHROPIC_API_KEY")?;
        Ok(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("INTAKE_EXTRACTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_EXTRACTION_MODEL.to_string()),
            max_tokens: parse_or("INTAKE_EXTRACTION_MAX_TOKENS", 2000)?,
            endpoint: std::env::var("INTAKE_EXTRACTION_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_EXTRACTION_ENDPOINT.to_string()),
            timeout: Duration::from_secs(parse_or("INTAKE_EXTRACTION_TIMEOUT_SECS", 60)?),
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
