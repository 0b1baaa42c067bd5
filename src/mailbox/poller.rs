//! Background poll loop: fetch → process → aggregate → mark `\Seen`.
//!
//! A failed cycle is logged and abandoned. The next tick starts over with a
//! fresh connection; nothing is retried in between.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{RawMessage, SearchQuery, fetch_batch, mark_seen};
use crate::config::MailboxConfig;
use crate::error::PipelineError;
use crate::pipeline::aggregator::{BatchReport, aggregate_batch};
use crate::pipeline::processor::DispatchProcessor;
use crate::store::DraftSink;

/// Spawn a background task that runs `poll_once` on every tick.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_poller(
    config: MailboxConfig,
    processor: Arc<DispatchProcessor>,
    sink: Arc<dyn DraftSink>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Dispatch poller started, polling every {}s on {}",
            config.poll_interval_secs, config.host
        );

        let mut tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Dispatch poller shutting down");
                return;
            }

            if let Err(e) = poll_once(&config, &processor, &sink).await {
                error!("Dispatch poll failed: {e}");
            }
        }
    });

    (handle, shutdown_flag)
}

/// Run a single cycle against the mailbox.
pub async fn poll_once(
    config: &MailboxConfig,
    processor: &Arc<DispatchProcessor>,
    sink: &Arc<dyn DraftSink>,
) -> Result<BatchReport, PipelineError> {
    let cfg = config.clone();
    let fetched_at = Utc::now();
    let query = SearchQuery::for_cycle(config, fetched_at.date_naive());
    debug!(criteria = %query.to_criteria(), "Searching mailbox");

    let messages = tokio::task::spawn_blocking(move || fetch_batch(&cfg, &query))
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

    let report = intake_batch(messages, processor, sink.as_ref(), fetched_at).await?;

    if config.mark_seen && !report.handled_uids.is_empty() {
        let cfg = config.clone();
        let uids = report.handled_uids.clone();
        match tokio::task::spawn_blocking(move || mark_seen(&cfg, &uids)).await {
            Ok(Ok(())) => debug!(count = report.handled_uids.len(), "Marked messages seen"),
            Ok(Err(e)) => warn!("Failed to mark messages seen: {e}"),
            Err(e) => warn!("Mark-seen task failed: {e}"),
        }
    }

    Ok(report)
}

/// Process and aggregate messages that were already fetched.
pub async fn intake_batch(
    messages: Vec<RawMessage>,
    processor: &Arc<DispatchProcessor>,
    sink: &dyn DraftSink,
    fetched_at: DateTime<Utc>,
) -> Result<BatchReport, PipelineError> {
    if messages.is_empty() {
        debug!("No matching messages this cycle");
        return Ok(BatchReport::default());
    }
    let outcomes = processor.process_batch(messages, fetched_at).await;
    aggregate_batch(outcomes, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySink;

    const NOTICE: &str = "From: dispatch@vendor.example\r\n\
Subject: Work Order 123456\r\n\
Date: Tue, 14 Jan 2025 10:00:00 +0000\r\n\
Content-Type: text/plain\r\n\
\r\n\
Building: ATL2 Floor 3\r\n";

    #[tokio::test]
    async fn empty_batch_is_empty_report() {
        let sink = InMemorySink::new();
        let processor = Arc::new(DispatchProcessor::default());
        let report = intake_batch(Vec::new(), &processor, &sink, Utc::now())
            .await
            .unwrap();
        assert_eq!(report, BatchReport::default());
        assert!(sink.work_orders().await.is_empty());
    }

    #[tokio::test]
    async fn batch_reaches_sink() {
        let sink = InMemorySink::new();
        let processor = Arc::new(DispatchProcessor::default());
        let messages = vec![
            RawMessage::new(1, vec![], NOTICE.as_bytes().to_vec()),
            RawMessage::new(2, vec![], b"   ".to_vec()),
        ];
        let report = intake_batch(messages, &processor, &sink, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.parse_failures, 1);
        assert_eq!(report.handled_uids, vec![1, 2]);
        let stored = sink.work_orders().await;
        assert_eq!(stored[0].draft.wo_number, "123456");
    }
}
