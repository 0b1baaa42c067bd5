//! Shared types for the dispatch pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mailbox::Uid;

// ── Normalized email ────────────────────────────────────────────────

/// A fetched message decoded into the parts extraction needs.
///
/// Missing subject/sender are empty strings, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEmail {
    pub uid: Uid,
    pub subject: String,
    pub sender: String,
    /// Message `Date`, or the fetch time when the header is missing.
    pub received_at: DateTime<Utc>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

impl NormalizedEmail {
    /// The body extraction runs on: HTML when present, else plain text.
    pub fn best_body(&self) -> &str {
        self.html_body
            .as_deref()
            .or(self.text_body.as_deref())
            .unwrap_or("")
    }
}

// ── Work-order draft ────────────────────────────────────────────────

/// Dispatch urgency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Emergency,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Map a vendor priority string such as `P2 - 24 Hour Response`.
    ///
    /// P5 and above (weekly/monthly PM windows) map to low.
    pub fn from_dispatch_code(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        let code: Option<u32> = lower.strip_prefix('p').and_then(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        });
        if code == Some(1) || lower.contains("emergency") {
            Self::Emergency
        } else if code == Some(2) || lower.contains("urgent") || lower.contains("24 hour") {
            Self::High
        } else if matches!(code, Some(3 | 4)) || lower.contains("48 hour") || lower.contains("72 hour")
        {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Dispatch vs scheduled preventive maintenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderKind {
    #[default]
    Dispatch,
    PreventiveMaintenance,
}

/// Fields a dispatch rule can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    WoNumber,
    Building,
    Priority,
    Kind,
    Address,
    City,
    State,
    Requestor,
    RequestorPhone,
    Nte,
    #[serde(rename = "work_order_description")]
    Description,
    DateEntered,
    TargetCompletion,
    AssetTag,
}

impl DraftField {
    pub const ALL: [DraftField; 14] = [
        Self::WoNumber,
        Self::Building,
        Self::Priority,
        Self::Kind,
        Self::Address,
        Self::City,
        Self::State,
        Self::Requestor,
        Self::RequestorPhone,
        Self::Nte,
        Self::Description,
        Self::DateEntered,
        Self::TargetCompletion,
        Self::AssetTag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WoNumber => "wo_number",
            Self::Building => "building",
            Self::Priority => "priority",
            Self::Kind => "kind",
            Self::Address => "address",
            Self::City => "city",
            Self::State => "state",
            Self::Requestor => "requestor",
            Self::RequestorPhone => "requestor_phone",
            Self::Nte => "nte",
            Self::Description => "work_order_description",
            Self::DateEntered => "date_entered",
            Self::TargetCompletion => "target_completion",
            Self::AssetTag => "asset_tag",
        }
    }
}

impl std::fmt::Display for DraftField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work-order fields pulled out of one dispatch email.
///
/// Every field is always present; anything the rules did not find keeps
/// its default. A re-run produces a new draft rather than updating one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderDraft {
    /// `[A-Z]?\d+` when present.
    pub wo_number: String,
    pub building: String,
    pub priority: Priority,
    pub kind: WorkOrderKind,
    pub address: String,
    pub city: String,
    pub state: String,
    pub requestor: String,
    pub requestor_phone: String,
    /// Not-to-exceed amount in USD.
    pub nte: f64,
    pub work_order_description: String,
    pub date_entered: Option<NaiveDateTime>,
    pub target_completion: String,
    pub asset_tag: String,
}

/// A draft plus the fields no rule filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub draft: WorkOrderDraft,
    pub missing: Vec<DraftField>,
}

impl Extraction {
    pub fn is_missing(&self, field: DraftField) -> bool {
        self.missing.contains(&field)
    }
}
