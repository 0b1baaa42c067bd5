//! Dispatch processor: raw message → normalized → sanitized → extracted.
//!
//! Each message is independent and side-effect free, so a batch fans out
//! across the blocking pool. A malformed message is logged and reported as
//! a `ParseError`; it never takes its siblings down with it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::mailbox::RawMessage;
use crate::pipeline::extractor::FieldExtractor;
use crate::pipeline::normalize::normalize;
use crate::pipeline::sanitize::{SanitizedBody, sanitize};
use crate::pipeline::types::{Extraction, NormalizedEmail};

/// One message taken all the way through extraction.
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub email: NormalizedEmail,
    pub body: SanitizedBody,
    pub extraction: Extraction,
}

pub struct DispatchProcessor {
    extractor: FieldExtractor,
}

impl DispatchProcessor {
    pub fn new(extractor: FieldExtractor) -> Self {
        Self { extractor }
    }

    pub fn extractor(&self) -> &FieldExtractor {
        &self.extractor
    }

    /// Process a single message.
    pub fn process(
        &self,
        raw: &RawMessage,
        fetched_at: DateTime<Utc>,
    ) -> Result<ProcessedMessage, ParseError> {
        let email = normalize(raw, fetched_at)?;
        let body = sanitize(email.best_body());
        let extraction = self.extractor.extract(&email.subject, &body);
        debug!(
            uid = email.uid,
            wo_number = %extraction.draft.wo_number,
            missing = extraction.missing.len(),
            "Message extracted"
        );
        Ok(ProcessedMessage {
            email,
            body,
            extraction,
        })
    }

    /// Process a fetched batch concurrently.
    ///
    /// Results come back in input order, one per message. Failures are
    /// logged here and returned so the caller can count them.
    pub async fn process_batch(
        self: &Arc<Self>,
        messages: Vec<RawMessage>,
        fetched_at: DateTime<Utc>,
    ) -> Vec<Result<ProcessedMessage, ParseError>> {
        let count = messages.len();
        info!(count, "Processing dispatch batch");

        let tasks = messages.into_iter().map(|raw| {
            let processor = Arc::clone(self);
            let uid = raw.uid;
            async move {
                tokio::task::spawn_blocking(move || processor.process(&raw, fetched_at))
                    .await
                    .unwrap_or_else(|e| {
                        Err(ParseError {
                            uid,
                            reason: format!("extraction task failed: {e}"),
                        })
                    })
            }
        });
        let results = join_all(tasks).await;

        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!(uid = err.uid, error = %err, "Skipping malformed message");
        }
        info!(
            processed = results.iter().filter(|r| r.is_ok()).count(),
            total = count,
            "Batch processing complete"
        );
        results
    }
}

impl Default for DispatchProcessor {
    fn default() -> Self {
        Self::new(FieldExtractor::dispatch())
    }
}
