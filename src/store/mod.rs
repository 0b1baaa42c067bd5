//! Persistence seam. The intake core produces records; whatever stores them
//! lives behind `DraftSink`.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesSink;
pub use memory::InMemorySink;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::pipeline::aggregator::{InvoiceRecord, WorkOrderRecord};

/// Receives draft records.
#[async_trait]
pub trait DraftSink: Send + Sync {
    /// Work-order numbers already stored, for duplicate suppression.
    async fn known_wo_numbers(&self) -> Result<HashSet<String>, SinkError>;

    async fn record_work_order(&self, record: WorkOrderRecord) -> Result<(), SinkError>;

    async fn record_invoice(&self, record: InvoiceRecord) -> Result<(), SinkError>;
}
