use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of an invoice, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub date: String,
    pub description: String,
    pub regular_hours: f64,
    pub ot_hours: f64,
    pub miles: f64,
    pub amount: f64,
}

/// Invoice fields extracted from a contractor document.
///
/// Numbers default to 0 and are never negative; optional strings default to
/// `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    pub invoice_number: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub regular_hours: f64,
    pub ot_hours: f64,
    pub miles: f64,
    pub total: f64,
    pub line_items: Vec<LineItem>,
    /// The model's own summary of what it read.
    pub raw_text: String,
}
