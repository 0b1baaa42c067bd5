//! Result aggregation: turns per-message outcomes into draft records, flags
//! incomplete ones for review, drops duplicates and hands the rest to the
//! persistence collaborator.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ParseError, PipelineError, SinkError};
use crate::invoice::{InvoiceDraft, MediaType};
use crate::mailbox::Uid;
use crate::pipeline::processor::ProcessedMessage;
use crate::pipeline::types::{DraftField, WorkOrderDraft};
use crate::store::DraftSink;

/// Whether a record can go straight through or needs a human first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewStatus {
    Ready,
    NeedsReview { reasons: Vec<String> },
}

impl ReviewStatus {
    fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Self::Ready
        } else {
            Self::NeedsReview { reasons }
        }
    }

    pub fn needs_review(&self) -> bool {
        matches!(self, Self::NeedsReview { .. })
    }
}

/// A work-order draft ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRecord {
    pub id: Uuid,
    pub uid: Uid,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub draft: WorkOrderDraft,
    pub review: ReviewStatus,
    pub missing: Vec<DraftField>,
}

impl WorkOrderRecord {
    pub fn from_processed(message: &ProcessedMessage) -> Self {
        let extraction = &message.extraction;
        let mut reasons = Vec::new();
        if extraction.draft.wo_number.is_empty() {
            reasons.push("missing wo_number".to_string());
        }
        if extraction.draft.building.is_empty() {
            reasons.push("missing building".to_string());
        }
        Self {
            id: Uuid::new_v4(),
            uid: message.email.uid,
            subject: message.email.subject.clone(),
            sender: message.email.sender.clone(),
            received_at: message.email.received_at,
            draft: extraction.draft.clone(),
            review: ReviewStatus::from_reasons(reasons),
            missing: extraction.missing.clone(),
        }
    }
}

/// An invoice draft ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    /// File name or other caller-chosen label for the document.
    pub source: String,
    pub media_type: MediaType,
    pub draft: InvoiceDraft,
    pub review: ReviewStatus,
}

impl InvoiceRecord {
    pub fn new(source: impl Into<String>, media_type: MediaType, draft: InvoiceDraft) -> Self {
        let mut reasons = Vec::new();
        if draft.invoice_number.is_none() {
            reasons.push("missing invoice number".to_string());
        }
        if draft.total == 0.0 {
            reasons.push("zero total".to_string());
        }
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            media_type,
            draft,
            review: ReviewStatus::from_reasons(reasons),
        }
    }
}

/// Outcome of one aggregated batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub fetched: usize,
    pub parsed: usize,
    pub parse_failures: usize,
    pub persisted: usize,
    pub needs_review: usize,
    pub duplicates: usize,
    /// One entry per record the sink refused.
    pub errors: Vec<String>,
    /// UIDs whose outcome is settled: persisted, duplicate or unparseable.
    /// Records the sink refused are left out so a later cycle sees them again.
    pub handled_uids: Vec<Uid>,
}

/// Hand a processed batch to `sink`.
///
/// Duplicates are work orders the sink already knows, or repeats of an
/// earlier record in the same batch. Drafts without a wo_number are never
/// treated as duplicates. A sink failure on one record is counted and does
/// not stop the rest; only the initial lookup can fail the whole call.
pub async fn aggregate_batch(
    outcomes: Vec<Result<ProcessedMessage, ParseError>>,
    sink: &dyn DraftSink,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport {
        fetched: outcomes.len(),
        ..Default::default()
    };
    let mut known: HashSet<String> = sink.known_wo_numbers().await?;

    for outcome in outcomes {
        let message = match outcome {
            Ok(message) => message,
            Err(e) => {
                report.parse_failures += 1;
                report.handled_uids.push(e.uid);
                continue;
            }
        };
        report.parsed += 1;
        let record = WorkOrderRecord::from_processed(&message);

        let wo = &record.draft.wo_number;
        if !wo.is_empty() && known.contains(wo) {
            info!(uid = record.uid, wo_number = %wo, "Work order already imported, skipping");
            report.duplicates += 1;
            report.handled_uids.push(record.uid);
            continue;
        }

        let uid = record.uid;
        let wo = wo.clone();
        let needs_review = record.review.needs_review();
        match sink.record_work_order(record).await {
            Ok(()) => {
                report.persisted += 1;
                if needs_review {
                    report.needs_review += 1;
                }
                if !wo.is_empty() {
                    known.insert(wo);
                }
                report.handled_uids.push(uid);
            }
            Err(e) => {
                error!(uid, error = %e, "Failed to persist work order draft");
                report.errors.push(format!("uid {uid}: {e}"));
            }
        }
    }

    if report.parse_failures > 0 {
        warn!(failures = report.parse_failures, "Some messages could not be parsed");
    }
    info!(
        fetched = report.fetched,
        persisted = report.persisted,
        needs_review = report.needs_review,
        duplicates = report.duplicates,
        "Batch aggregated"
    );
    Ok(report)
}

/// Hand one extracted invoice to `sink`.
pub async fn record_invoice(
    source: impl Into<String>,
    media_type: MediaType,
    draft: InvoiceDraft,
    sink: &dyn DraftSink,
) -> Result<InvoiceRecord, SinkError> {
    let record = InvoiceRecord::new(source, media_type, draft);
    sink.record_invoice(record.clone()).await?;
    Ok(record)
}
