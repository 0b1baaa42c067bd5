use std::collections::HashSet;
use std::io::Write;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use super::DraftSink;
use crate::error::SinkError;
use crate::pipeline::aggregator::{InvoiceRecord, WorkOrderRecord};

/// Writes each record as one JSON line, tagged with its kind.
///
/// Remembers the work-order numbers it wrote, so duplicate suppression works
/// for the lifetime of the sink.
pub struct JsonLinesSink<W: Write + Send> {
    inner: Mutex<Inner<W>>,
}

struct Inner<W> {
    out: W,
    seen: HashSet<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    WorkOrder(&'a WorkOrderRecord),
    Invoice(&'a InvoiceRecord),
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                out,
                seen: HashSet::new(),
            }),
        }
    }

    /// Seed the known work-order numbers, e.g. from an earlier export.
    pub fn with_known(self, known: impl IntoIterator<Item = String>) -> Self {
        let mut inner = self.inner.into_inner();
        inner.seen.extend(known);
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner().out
    }
}

impl<W> Inner<W>
where
    W: Write,
{
    fn write_line(&mut self, id: String, line: &Line<'_>) -> Result<(), SinkError> {
        let json = serde_json::to_string(line).map_err(|e| SinkError::Rejected {
            id,
            reason: e.to_string(),
        })?;
        writeln!(self.out, "{json}")
            .and_then(|_| self.out.flush())
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> DraftSink for JsonLinesSink<W> {
    async fn known_wo_numbers(&self) -> Result<HashSet<String>, SinkError> {
        Ok(self.inner.lock().await.seen.clone())
    }

    async fn record_work_order(&self, record: WorkOrderRecord) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().await;
        inner.write_line(record.id.to_string(), &Line::WorkOrder(&record))?;
        if !record.draft.wo_number.is_empty() {
            inner.seen.insert(record.draft.wo_number);
        }
        Ok(())
    }

    async fn record_invoice(&self, record: InvoiceRecord) -> Result<(), SinkError> {
        self.inner
            .lock()
            .await
            .write_line(record.id.to_string(), &Line::Invoice(&record))
    }
}
