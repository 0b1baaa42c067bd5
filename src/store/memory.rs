use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::DraftSink;
use crate::error::SinkError;
use crate::pipeline::aggregator::{InvoiceRecord, WorkOrderRecord};

/// Keeps records in memory, in arrival order.
#[derive(Default)]
pub struct InMemorySink {
    work_orders: Mutex<Vec<WorkOrderRecord>>,
    invoices: Mutex<Vec<InvoiceRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored work orders.
    pub async fn work_orders(&self) -> Vec<WorkOrderRecord> {
        self.work_orders.lock().await.clone()
    }

    pub async fn invoices(&self) -> Vec<InvoiceRecord> {
        self.invoices.lock().await.clone()
    }
}

#[async_trait]
impl DraftSink for InMemorySink {
    async fn known_wo_numbers(&self) -> Result<HashSet<String>, SinkError> {
        Ok(self
            .work_orders
            .lock()
            .await
            .iter()
            .filter(|r| !r.draft.wo_number.is_empty())
            .map(|r| r.draft.wo_number.clone())
            .collect())
    }

    async fn record_work_order(&self, record: WorkOrderRecord) -> Result<(), SinkError> {
        self.work_orders.lock().await.push(record);
        Ok(())
    }

    async fn record_invoice(&self, record: InvoiceRecord) -> Result<(), SinkError> {
        self.invoices.lock().await.push(record);
        Ok(())
    }
}
