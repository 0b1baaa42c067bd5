//! Mailbox connector: IMAP session lifecycle plus search/fetch primitives.
//!
//! One `MailboxSession` serves one poll cycle. Commands take `&mut self`, so a
//! session can never have two search/fetch sequences in flight at once.

pub mod poller;
pub mod session;
mod wire;

pub use poller::{intake_batch, poll_once, spawn_poller};
pub use session::{MailboxSession, TlsStream, connect, fetch_batch, fetch_cycle, mark_seen};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::MailboxConfig;

/// Stable per-mailbox message identifier.
pub type Uid = u32;

/// Raw bytes for one fetched message. Dropped once the message is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: Uid,
    pub flags: Vec<String>,
    raw: Vec<u8>,
    header_len: usize,
    /// BODYSTRUCTURE, when the fetch asked for it.
    pub structure: Option<String>,
}

impl RawMessage {
    pub fn new(uid: Uid, flags: Vec<String>, raw: Vec<u8>) -> Self {
        let header_len = header_boundary(&raw);
        Self {
            uid,
            flags,
            raw,
            header_len,
            structure: None,
        }
    }

    pub fn with_structure(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    /// Header section, including the blank line that ends it.
    pub fn header(&self) -> &[u8] {
        &self.raw[..self.header_len]
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    /// The whole message as fetched.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen"))
    }
}

/// Offset just past the first empty line (CRLF or bare LF), or the whole
/// buffer when the message has no body.
fn header_boundary(raw: &[u8]) -> usize {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => raw.len(),
    }
}

/// Which parts of each message a fetch retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartSelector {
    /// Entire message. Uses `BODY.PEEK[]` so the server does not set `\Seen`.
    #[default]
    Full,
    /// Subject/From/Date header fields plus the MIME body structure.
    HeadersWithStructure,
}

impl PartSelector {
    pub(crate) fn fetch_items(self) -> &'static str {
        match self {
            Self::Full => "(UID FLAGS BODY.PEEK[])",
            Self::HeadersWithStructure => {
                "(UID FLAGS BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE)] BODYSTRUCTURE)"
            }
        }
    }
}

/// Server-side search predicate.
///
/// All set criteria are AND-ed; subject keywords are OR-ed among themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub since: Option<NaiveDate>,
    pub from: Option<String>,
    pub unseen_only: bool,
    pub subject_any: Vec<String>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        let sender = sender.into();
        self.from = (!sender.trim().is_empty()).then(|| sender.trim().to_string());
        self
    }

    pub fn unseen_only(mut self, unseen: bool) -> Self {
        self.unseen_only = unseen;
        self
    }

    pub fn subject_any(mut self, keywords: Vec<String>) -> Self {
        self.subject_any = keywords;
        self
    }

    /// The query a poll cycle runs, relative to `today`.
    pub fn for_cycle(config: &MailboxConfig, today: NaiveDate) -> Self {
        let since = today
            .checked_sub_days(chrono::Days::new(u64::from(config.lookback_days)))
            .unwrap_or(today);
        Self::new()
            .since(since)
            .from_sender(config.sender_filter.clone())
            .unseen_only(config.unseen_only)
            .subject_any(config.subject_keywords.clone())
    }

    /// Search criteria in IMAP syntax (RFC 3501 §6.4.4).
    pub fn to_criteria(&self) -> String {
        let mut parts = Vec::new();
        if self.unseen_only {
            parts.push("UNSEEN".to_string());
        }
        if let Some(date) = self.since {
            parts.push(format!("SINCE {}", imap_date(date)));
        }
        if let Some(ref from) = self.from {
            parts.push(format!("FROM {}", quote(from)));
        }
        if !self.subject_any.is_empty() {
            parts.push(subject_disjunction(&self.subject_any));
        }
        if parts.is_empty() {
            return "ALL".to_string();
        }
        parts.join(" ")
    }
}

/// IMAP date, e.g. `05-Jan-2026`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Quote a string for use as an IMAP quoted-string.
pub(crate) fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// `OR` is binary in IMAP, so N keywords nest right.
fn subject_disjunction(keywords: &[String]) -> String {
    match keywords {
        [] => String::new(),
        [only] => format!("SUBJECT {}", quote(only)),
        [first, rest @ ..] => format!(
            "OR SUBJECT {} {}",
            quote(first),
            subject_disjunction(rest)
        ),
    }
}
