//! Invoice extraction from contractor documents and images.
//!
//! One model call per document, bounded by a caller-supplied timeout.
//! Calls share no state, so any number can run at once.

mod parse;
mod types;

pub use crate::llm::MediaType;
pub use parse::parse_invoice_response;
pub use types::{InvoiceDraft, LineItem};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::InvoiceError;
use crate::llm::{ExtractionModel, ExtractionRequest};

/// Default output budget for one extraction call.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Fixed instruction sent alongside every document.
pub const INVOICE_INSTRUCTION: &str = r#"Extract the following information from this contractor invoice:

1. Invoice Number (if visible)
2. Period/Date Range (start and end dates in YYYY-MM-DD format)
3. Total Regular Hours worked
4. Total Overtime (OT) Hours worked
5. Total Miles/Mileage
6. Total Dollar Amount

Also extract individual line items if present (date, description, regular hours, OT hours, miles, amount for each).

Respond in this exact JSON format:
{
  "invoiceNumber": "string or null",
  "periodStart": "YYYY-MM-DD or null",
  "periodEnd": "YYYY-MM-DD or null",
  "regularHours": number,
  "otHours": number,
  "miles": number,
  "total": number,
  "lineItems": [
    {
      "date": "string",
      "description": "string",
      "regularHours": number,
      "otHours": number,
      "miles": number,
      "amount": number
    }
  ],
  "rawText": "Brief summary of what you found in the invoice"
}

If you cannot find a value, use 0 for numbers and null for strings. Only respond with valid JSON, no other text."#;

pub struct InvoiceExtractor {
    model: Arc<dyn ExtractionModel>,
    max_tokens: u32,
}

impl InvoiceExtractor {
    pub fn new(model: Arc<dyn ExtractionModel>) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Extract one invoice.
    ///
    /// The model call is dropped when `timeout` elapses. Transport errors,
    /// timeouts and unparseable answers are returned as-is; nothing is
    /// retried here.
    pub async fn extract(
        &self,
        payload: Vec<u8>,
        media_type: MediaType,
        timeout: Duration,
    ) -> Result<InvoiceDraft, InvoiceError> {
        if payload.is_empty() {
            return Err(InvoiceError::EmptyPayload);
        }
        let request = ExtractionRequest {
            payload,
            media_type,
            instruction: INVOICE_INSTRUCTION.to_string(),
            max_tokens: self.max_tokens,
        };

        debug!(model = self.model.model_name(), %media_type, "Extracting invoice");
        let raw = tokio::time::timeout(timeout, self.model.extract(request))
            .await
            .map_err(|_| InvoiceError::Timeout(timeout))??;

        let draft = parse_invoice_response(&raw).inspect_err(|e| {
            warn!(reason = %e.reason, raw = %e.raw_text, "Invoice response had no usable JSON");
        })?;
        info!(
            invoice_number = draft.invoice_number.as_deref().unwrap_or("-"),
            total = draft.total,
            line_items = draft.line_items.len(),
            "Invoice extracted"
        );
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::error::LlmError;

    /// Returns a canned answer and records what it was asked.
    struct CannedModel {
        answer: Result<String, ()>,
        delay: Duration,
        seen: Mutex<Vec<(MediaType, usize, u32)>>,
    }

    impl CannedModel {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExtractionModel for CannedModel {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn extract(&self, request: ExtractionRequest) -> Result<String, LlmError> {
            assert!(request.instruction.contains("\"lineItems\""));
            self.seen.lock().unwrap().push((
                request.media_type,
                request.payload.len(),
                request.max_tokens,
            ));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answer.clone().map_err(|_| LlmError::RateLimited {
                provider: "canned".into(),
                retry_after: None,
            })
        }
    }

    #[tokio::test]
    async fn extracts_embedded_json() {
        let model = Arc::new(CannedModel::answering(
            r#"Here is the data: {"invoiceNumber":"INV-1","regularHours":8} Thanks"#,
        ));
        let extractor = InvoiceExtractor::new(model.clone()).with_max_tokens(512);
        let draft = extractor
            .extract(vec![1, 2, 3], MediaType::Pdf, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(draft.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(draft.regular_hours, 8.0);
        assert_eq!(
            model.seen.lock().unwrap().as_slice(),
            &[(MediaType::Pdf, 3, 512)]
        );
    }

    #[tokio::test]
    async fn empty_payload_never_calls_model() {
        let model = Arc::new(CannedModel::answering("{}"));
        let extractor = InvoiceExtractor::new(model.clone());
        let err = extractor
            .extract(Vec::new(), MediaType::Jpeg, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::EmptyPayload));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_answer_is_extraction_error() {
        let extractor = InvoiceExtractor::new(Arc::new(CannedModel::answering(
            r#"{"invoiceNumber": "INV-1", "lineItems": [{"#,
        )));
        let err = extractor
            .extract(vec![0], MediaType::Png, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            InvoiceError::Extraction(e) => assert!(e.raw_text.starts_with("{\"invoiceNumber\"")),
            other => panic!("expected Extraction, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_errors_pass_through() {
        let model = CannedModel {
            answer: Err(()),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        };
        let extractor = InvoiceExtractor::new(Arc::new(model));
        let err = extractor
            .extract(vec![0], MediaType::Png, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::Model(LlmError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = CannedModel {
            answer: Ok("{}".into()),
            delay: Duration::from_secs(10),
            seen: Mutex::new(Vec::new()),
        };
        let extractor = InvoiceExtractor::new(Arc::new(model));
        let err = extractor
            .extract(vec![0], MediaType::Jpeg, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::Timeout(d) if d == Duration::from_millis(50)));
    }
}
