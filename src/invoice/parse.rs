//! Untrusted model text → `InvoiceDraft`.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::invoice::types::{InvoiceDraft, LineItem};
use crate::json::first_balanced_object;

/// Parse the first JSON object embedded in `raw`.
///
/// Either a fully-defaulted draft or an `ExtractionError` carrying the head
/// of `raw`; never a partial draft.
pub fn parse_invoice_response(raw: &str) -> Result<InvoiceDraft, ExtractionError> {
    let span = first_balanced_object(raw)
        .ok_or_else(|| ExtractionError::new("no JSON object found in response", raw))?;
    let value: Value = serde_json::from_str(span)
        .map_err(|e| ExtractionError::new(format!("invalid JSON: {e}"), raw))?;
    let Value::Object(obj) = value else {
        return Err(ExtractionError::new("JSON value is not an object", raw));
    };

    Ok(InvoiceDraft {
        invoice_number: opt_string(obj.get("invoiceNumber")),
        period_start: opt_date(obj.get("periodStart")),
        period_end: opt_date(obj.get("periodEnd")),
        regular_hours: number(obj.get("regularHours")),
        ot_hours: number(obj.get("otHours")),
        miles: number(obj.get("miles")),
        total: number(obj.get("total")),
        line_items: line_items(obj.get("lineItems")),
        raw_text: opt_string(obj.get("rawText")).unwrap_or_default(),
    })
}

/// Numbers, numeric strings (`"$1,200.50"`) and null. Missing, unreadable
/// and negative values become 0.
fn number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
                .collect();
            cleaned.parse().unwrap_or(0.0)
        }
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 { n } else { 0.0 }
}

/// Strings with `""` and `"null"` read as absent. Numbers are stringified.
fn opt_string(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty() && !s.eq_ignore_ascii_case("null")).then_some(s)
}

fn opt_date(value: Option<&Value>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&opt_string(value)?, "%Y-%m-%d").ok()
}

fn line_items(value: Option<&Value>) -> Vec<LineItem> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(line_item)
        .collect()
}

fn line_item(obj: &Map<String, Value>) -> LineItem {
    LineItem {
        date: opt_string(obj.get("date")).unwrap_or_default(),
        description: opt_string(obj.get("description")).unwrap_or_default(),
        regular_hours: number(obj.get("regularHours")),
        ot_hours: number(obj.get("otHours")),
        miles: number(obj.get("miles")),
        amount: number(obj.get("amount")),
    }
}
