//! Field extractor: runs the rule table and assembles a `WorkOrderDraft`.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

use crate::pipeline::rules::{RuleHit, RuleSet};
use crate::pipeline::sanitize::SanitizedBody;
use crate::pipeline::types::{DraftField, Extraction, Priority, WorkOrderDraft, WorkOrderKind};

static WO_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]?\d+$").unwrap());
static EMPTY_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*,").unwrap());
static MERIDIEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+([AP]M)$").unwrap());

/// Longest description kept on a draft.
const DESCRIPTION_MAX_CHARS: usize = 2000;

const DATE_ENTERED_FORMATS: &[&str] = &[
    "%B %d %Y %I:%M%p",
    "%B %d %Y %I:%M:%S%p",
    "%B %d %Y %H:%M",
    "%B %d %Y %H:%M:%S",
];

/// Applies a `RuleSet` to one message.
pub struct FieldExtractor {
    rules: RuleSet,
}

impl FieldExtractor {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Extractor with the built-in dispatch rules.
    pub fn dispatch() -> Self {
        Self::new(RuleSet::dispatch_rules())
    }

    /// Extractor for notice text pasted without a subject.
    pub fn pasted() -> Self {
        Self::new(RuleSet::pasted_rules())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Build a draft from `(subject, body)`.
    ///
    /// Never fails: a field no rule fills keeps its default and is listed in
    /// `Extraction::missing`.
    pub fn extract(&self, subject: &str, body: &SanitizedBody) -> Extraction {
        let mut builder = DraftBuilder::default();
        for hit in self.rules.evaluate(subject, body) {
            builder.offer(hit);
        }
        builder.finish()
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::dispatch()
    }
}

/// First-writer-wins assembly of a draft. Appending rows are the exception:
/// they extend the description an earlier row set.
#[derive(Default)]
struct DraftBuilder {
    draft: WorkOrderDraft,
    filled: HashSet<DraftField>,
}

impl DraftBuilder {
    fn offer(&mut self, hit: RuleHit<'_>) {
        if self.filled.contains(&hit.field) {
            if hit.appends && hit.field == DraftField::Description {
                self.append_description(&hit.value);
            }
            return;
        }
        if self.assign(hit.field, &hit.value) {
            self.filled.insert(hit.field);
        } else {
            debug!(rule = hit.rule, field = %hit.field, "Rule capture rejected");
        }
    }

    /// Convert and store one value. Returns false when the value is unusable.
    fn assign(&mut self, field: DraftField, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let draft = &mut self.draft;
        match field {
            DraftField::WoNumber => {
                let wo = value.to_ascii_uppercase();
                if !WO_NUMBER.is_match(&wo) {
                    return false;
                }
                draft.wo_number = wo;
            }
            DraftField::Building => draft.building = value.to_string(),
            DraftField::Priority => draft.priority = Priority::from_dispatch_code(value),
            DraftField::Kind => draft.kind = WorkOrderKind::PreventiveMaintenance,
            DraftField::Address => {
                let collapsed = EMPTY_SEGMENT.replace_all(value, ",");
                let address = collapsed.trim().trim_end_matches(',').trim();
                if address.is_empty() {
                    return false;
                }
                draft.address = address.to_string();
            }
            DraftField::City => draft.city = value.to_string(),
            DraftField::State => draft.state = value.to_ascii_uppercase(),
            DraftField::Requestor => draft.requestor = value.to_string(),
            DraftField::RequestorPhone => {
                let phone: String = value
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '-')
                    .collect();
                if !phone.chars().any(|c| c.is_ascii_digit()) {
                    return false;
                }
                draft.requestor_phone = phone;
            }
            DraftField::Nte => match value.replace(',', "").parse::<f64>() {
                Ok(nte) if nte.is_finite() && nte >= 0.0 => draft.nte = nte,
                _ => return false,
            },
            DraftField::Description => draft.work_order_description = value.to_string(),
            DraftField::DateEntered => match parse_date_entered(value) {
                Some(dt) => draft.date_entered = Some(dt),
                None => return false,
            },
            DraftField::TargetCompletion => draft.target_completion = value.to_string(),
            DraftField::AssetTag => draft.asset_tag = value.to_string(),
        }
        true
    }

    fn append_description(&mut self, extra: &str) {
        let extra = extra.trim();
        let current = &mut self.draft.work_order_description;
        if extra.is_empty() || current.contains(extra) {
            return;
        }
        let joined = format!("{current}\n\nPM Action: {extra}");
        *current = joined.chars().take(DESCRIPTION_MAX_CHARS).collect();
    }

    fn finish(self) -> Extraction {
        // Kind defaults to a regular dispatch; not finding a PM marker is
        // not a miss.
        let missing: Vec<DraftField> = DraftField::ALL
            .into_iter()
            .filter(|f| *f != DraftField::Kind && !self.filled.contains(f))
            .collect();
        for field in &missing {
            debug!(field = %field, "Field not found, left at default");
        }
        Extraction {
            draft: self.draft,
            missing,
        }
    }
}

/// Parse `Dec 2 2025 8:17AM` / `January 15 2025 10:30 AM` / `Jan 5 2026 14:48`.
fn parse_date_entered(value: &str) -> Option<NaiveDateTime> {
    let spaced = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let compact = MERIDIEM.replace(&spaced, "$1");
    DATE_ENTERED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&compact, fmt).ok())
}
