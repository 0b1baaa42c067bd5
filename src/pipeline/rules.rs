//! Declarative field-extraction rules for vendor dispatch notices.
//!
//! Each rule is a row of data: where to look (subject or sanitized body), a
//! compiled pattern, which draft field each capture group fills, and the
//! stop tokens that bound a capture. Rows are evaluated in order; the
//! extractor keeps the first value a field receives, so earlier rows take
//! precedence over later fallbacks.
//!
//! Supporting a new vendor format means adding rows, not control flow.

use regex::Regex;
use tracing::debug;

use crate::pipeline::sanitize::SanitizedBody;
use crate::pipeline::types::DraftField;

/// Which text a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Subject,
    Body,
}

/// A single extraction rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Human-readable rule name, used in logs.
    pub name: String,
    pub source: RuleSource,
    pub regex: Regex,
    /// Capture group `i + 1` fills `targets[i]`. A pattern without groups
    /// fills its single target with the whole match.
    pub targets: Vec<DraftField>,
    /// A capture ends at the earliest of these (case-insensitive).
    stop_tokens: Vec<String>,
    max_chars: Option<usize>,
    appends: bool,
}

impl FieldRule {
    pub fn new(
        name: &str,
        source: RuleSource,
        pattern: &str,
        targets: &[DraftField],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            source,
            regex: Regex::new(pattern)?,
            targets: targets.to_vec(),
            stop_tokens: Vec::new(),
            max_chars: None,
            appends: false,
        })
    }

    pub fn stop_at(mut self, tokens: &[&str]) -> Self {
        self.stop_tokens = tokens.iter().map(|t| t.to_ascii_lowercase()).collect();
        self
    }

    /// Truncate captures to at most `n` characters.
    pub fn max_chars(mut self, n: usize) -> Self {
        self.max_chars = Some(n);
        self
    }

    /// Add to a field an earlier row already filled, instead of yielding
    /// to it.
    pub fn appending(mut self) -> Self {
        self.appends = true;
        self
    }

    pub fn stop_tokens(&self) -> &[String] {
        &self.stop_tokens
    }

    pub fn appends(&self) -> bool {
        self.appends
    }

    /// Captured values for this rule's targets. Empty when the pattern
    /// does not match; unmatched optional groups are skipped.
    pub fn apply(&self, subject: &str, body: &str) -> Vec<(DraftField, String)> {
        let haystack = match self.source {
            RuleSource::Subject => subject,
            RuleSource::Body => body,
        };
        let Some(caps) = self.regex.captures(haystack) else {
            return Vec::new();
        };

        if caps.len() == 1 {
            return match (self.targets.first(), caps.get(0)) {
                (Some(&field), Some(m)) => vec![(field, self.bound(m.as_str()))],
                _ => Vec::new(),
            };
        }

        self.targets
            .iter()
            .enumerate()
            .filter_map(|(i, &field)| caps.get(i + 1).map(|m| (field, self.bound(m.as_str()))))
            .collect()
    }

    /// Cut at the earliest stop token, cap the length, trim.
    ///
    /// A capture keeps at least its first non-blank character, so a value
    /// that itself starts with a stop token ("Building: Floor 3") survives.
    fn bound(&self, value: &str) -> String {
        let lower = value.to_ascii_lowercase();
        let from = value
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map_or(value.len(), |(i, c)| i + c.len_utf8());
        let end = self
            .stop_tokens
            .iter()
            .filter_map(|token| lower[from..].find(token.as_str()).map(|i| from + i))
            .min()
            .unwrap_or(value.len());
        let cut = value[..end].trim();
        match self.max_chars {
            Some(n) => cut.chars().take(n).collect::<String>().trim_end().to_string(),
            None => cut.to_string(),
        }
    }
}

/// A value one rule captured for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit<'a> {
    pub rule: &'a str,
    pub field: DraftField,
    pub value: String,
    /// The rule adds to an existing value rather than yielding to it.
    pub appends: bool,
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<FieldRule>,
}

impl RuleSet {
    /// Rules for the facilities-dispatch notices this crate ingests: the
    /// regular dispatch layout and the preventive-maintenance layout.
    pub fn dispatch_rules() -> Self {
        use DraftField::*;
        use RuleSource::{Body, Subject};

        let rules = vec![
            // "Dispatch of Work Order C2926480", "PM Work Order A123", "work_order_456"
            row(
                "wo_number.subject",
                Subject,
                r"(?i)(?:PM[\s_]+)?Work[\s_]+Order[\s_]+([A-Z]?\d+)",
                &[WoNumber],
            ),
            row(
                "kind.subject",
                Subject,
                r"(?i)\bPM[\s_]+Work[\s_]+Order",
                &[Kind],
            ),
            row(
                "kind.body",
                Body,
                r"(?i)Preventive Maintenance Description",
                &[Kind],
            ),
            // "Priority: P1-Emergency", "Priority: P10 - 1 Month"
            row(
                "priority.body",
                Body,
                r"(?i)Priority[:\s_]*(P\d+.*)",
                &[Priority],
            )
            .stop_at(&[
                "Target",
                "Order Status",
                "Date Entered",
                "Service Location",
                "Problem Description",
                "Building",
            ]),
            row(
                "priority.subject",
                Subject,
                r"(?i)Priority[:\s_]*(P\d+)",
                &[Priority],
            ),
            // "Date Entered: Dec 2 2025 8:17AM UTC-05"
            row(
                "date_entered",
                Body,
                r"(?i)Date Entered:\s*([A-Za-z]+\s+\d+\s+\d{4}\s+\d{1,2}:\d{2}(?::\d{2})?\s*(?:[AP]M)?)",
                &[DateEntered],
            ),
            row("building", Body, r"(?i)Building:\s*(.*)", &[Building])
                .stop_at(&["Floor", "Area", "Country"])
                .max_chars(200),
            // "Address: 124 CREEKSIDE ROAD, , WEST COLUMBIA, SC, 29172,"
            row("address", Body, r"(?i)Address:\s*(.*)", &[Address])
                .stop_at(&["Country", "Building"]),
            // "Country, St, City: US, SC, West Columbia"
            row(
                "location",
                Body,
                r"(?i)Country,?\s*St,?\s*City[:\s]*(?:USA?),?\s*([A-Z]{2}),?\s*([A-Za-z\s]+)",
                &[State, City],
            )
            .stop_at(&["Building", "Floor", "Area", "Address"]),
            // "Work Order Requestor Name and Phone: Warren Newton, 207-341-3521"
            row(
                "requestor",
                Body,
                r"(?i)Work Order Requestor Name and Phone:\s*([^,]+),?\s*([\d\-\(\)\s]+)?",
                &[Requestor, RequestorPhone],
            )
            .stop_at(&["Problem Description", "Assignment Name"]),
            // "UPS Site Contact: Adriana Davis (980-298-0331)"
            row(
                "requestor.site_contact",
                Body,
                r"(?i)UPS Site Contact:\s*([^(]+)\(([\d\-\s]+)\)",
                &[Requestor, RequestorPhone],
            ),
            row(
                "nte",
                Body,
                r"(?i)should not exceed\s*\**\s*\$?([\d,]+(?:\.\d+)?)\s*USD",
                &[Nte],
            ),
            row(
                "description",
                Body,
                r"(?i)Problem Description:\s*(.*)",
                &[Description],
            )
            .stop_at(&["Assignment Name", "Notes to Vendor", "Service Location"])
            .max_chars(2000),
            row(
                "description.preventive",
                Body,
                r"(?i)Preventive Maintenance Description:\s*(.*)",
                &[Description],
            )
            .stop_at(&["Service Location", "Asset", "PM Action"])
            .max_chars(2000),
            // "PM Action Steps: ----- Check valves and gauges"
            row(
                "description.pm_action",
                Body,
                r"(?i)PM Action Steps:\s*-*\s*(.*)",
                &[Description],
            )
            .stop_at(&["If you have any questions", "Assignment Name"])
            .max_chars(2000)
            .appending(),
            row(
                "target_completion",
                Body,
                r"(?i)Target Completion:\s*([A-Za-z]+\s+\d+\s+\d{4})",
                &[TargetCompletion],
            ),
            row("asset_tag", Body, r"(?i)Tag Number:\s*(\d+)", &[AssetTag]),
        ];

        Self { rules }
    }

    /// Rules for notice text pasted without its email envelope.
    ///
    /// There is no subject to carry the work-order number, so the body is
    /// searched for it as well. Mailbox intake never uses this table: a
    /// message whose subject names no work order keeps an empty number.
    pub fn pasted_rules() -> Self {
        let mut set = Self::dispatch_rules();
        set.rules.insert(
            1,
            // "work order number: C2959324"
            row(
                "wo_number.body",
                RuleSource::Body,
                r"(?i)\bwork[\s_]+order(?:\s+(?:number|no\.?|#))?[\s:#_]*([A-Z]?\d{5,})\b",
                &[DraftField::WoNumber],
            ),
        );
        set
    }

    /// An empty rule set (for testing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. It ranks below every existing rule.
    pub fn add_rule(&mut self, rule: FieldRule) {
        self.rules.push(rule);
    }

    /// Append a rule built from a pattern string.
    pub fn add_pattern(
        &mut self,
        name: &str,
        source: RuleSource,
        pattern: &str,
        targets: &[DraftField],
        stop_tokens: &[&str],
    ) -> Result<(), regex::Error> {
        self.rules
            .push(FieldRule::new(name, source, pattern, targets)?.stop_at(stop_tokens));
        Ok(())
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every capture from every matching rule, in rule order.
    pub fn evaluate<'a>(&'a self, subject: &str, body: &SanitizedBody) -> Vec<RuleHit<'a>> {
        let mut hits = Vec::new();
        for rule in &self.rules {
            for (field, value) in rule.apply(subject, body.as_str()) {
                debug!(rule = %rule.name, field = %field, "Rule matched");
                hits.push(RuleHit {
                    rule: &rule.name,
                    field,
                    value,
                    appends: rule.appends,
                });
            }
        }
        hits
    }
}

/// Built-in row. Patterns are literals, so compilation cannot fail.
fn row(name: &str, source: RuleSource, pattern: &str, targets: &[DraftField]) -> FieldRule {
    FieldRule {
        name: name.into(),
        source,
        regex: Regex::new(pattern).unwrap(),
        targets: targets.to_vec(),
        stop_tokens: Vec::new(),
        max_chars: None,
        appends: false,
    }
}
