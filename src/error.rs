//! Error types for dispatch intake.

use std::time::Duration;

/// Number of raw-response characters kept on an `ExtractionError`.
pub const RAW_SNIPPET_CHARS: usize = 500;

/// Top-level error type for the intake core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Invoice error: {0}")]
    Invoice(#[from] InvoiceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox session errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Server rejected the credentials. Fatal for the poll cycle.
    #[error("Mailbox authentication failed for {username}: {reason}")]
    Auth { username: String, reason: String },

    /// Connection or transport failure. Retryable by the caller.
    #[error("Mailbox network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// Server answered a command with NO/BAD, or sent something unreadable.
    #[error("IMAP {command} failed: {response}")]
    Protocol { command: String, response: String },

    #[error("Mailbox session already closed")]
    Closed,
}

impl MailboxError {
    /// Whether an external scheduler may retry the cycle as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Closed)
    }
}

/// A single fetched buffer could not be decoded as a message.
#[derive(Debug, thiserror::Error)]
#[error("Message uid {uid} is malformed: {reason}")]
pub struct ParseError {
    pub uid: u32,
    pub reason: String,
}

/// External extraction model errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The model response held no usable JSON object.
///
/// Carries the head of the raw response so the failure can be diagnosed
/// without logging whole documents.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to parse invoice data: {reason}")]
pub struct ExtractionError {
    pub reason: String,
    pub raw_text: String,
}

impl ExtractionError {
    pub fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw_text: raw.chars().take(RAW_SNIPPET_CHARS).collect(),
        }
    }
}

/// Invoice extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("Empty invoice payload")]
    EmptyPayload,

    #[error("Extraction call failed: {0}")]
    Model(#[from] LlmError),

    #[error("Extraction call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Persistence collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Draft {id} rejected: {reason}")]
    Rejected { id: String, reason: String },

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Poll-cycle errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mailbox fetch failed: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Sink lookup failed: {0}")]
    Sink(#[from] SinkError),
}

/// Result type alias for the intake core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_keeps_first_500_chars() {
        let raw = "x".repeat(800);
        let err = ExtractionError::new("no JSON object found", &raw);
        assert_eq!(err.raw_text.len(), RAW_SNIPPET_CHARS);
    }

    #[test]
    fn extraction_error_snippet_respects_char_boundaries() {
        let raw = "é".repeat(600);
        let err = ExtractionError::new("bad", &raw);
        assert_eq!(err.raw_text.chars().count(), RAW_SNIPPET_CHARS);
    }

    #[test]
    fn network_errors_are_retryable_auth_is_not() {
        let net = MailboxError::Network(std::io::Error::other("reset"));
        let auth = MailboxError::Auth {
            username: "ops@example.com".into(),
            reason: "bad password".into(),
        };
        assert!(net.is_retryable());
        assert!(!auth.is_retryable());
    }

    #[test]
    fn top_level_error_wraps_component_errors() {
        let err: Error = ParseError {
            uid: 7,
            reason: "no header section".into(),
        }
        .into();
        assert!(err.to_string().contains("uid 7"));
    }
}
