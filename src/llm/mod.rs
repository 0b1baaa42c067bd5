//! External structured-extraction model.
//!
//! The invoice path sends one document or image plus a fixed instruction and
//! gets free-form text back. `ExtractionModel` is the seam: production uses
//! `AnthropicModel`, tests plug in stubs.

mod anthropic;

pub use anthropic::AnthropicModel;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Media types the extraction model accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "application/pdf")]
    Pdf,
    #[default]
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MediaType {
    /// Map a declared MIME type. Unknown, empty and
    /// `application/octet-stream` fall back to JPEG.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Self::Pdf,
            "image/png" => Self::Png,
            "image/gif" => Self::Gif,
            "image/webp" => Self::Webp,
            _ => Self::Jpeg,
        }
    }

    /// Guess from a file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            _ => Self::Jpeg,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// PDFs go up as `document` blocks, everything else as `image`.
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// One extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub payload: Vec<u8>,
    pub media_type: MediaType,
    pub instruction: String,
    pub max_tokens: u32,
}

/// A model that reads a document and answers in text.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// The model's raw text answer. No retries happen here.
    async fn extract(&self, request: ExtractionRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_fallbacks() {
        assert_eq!(MediaType::from_mime("application/pdf"), MediaType::Pdf);
        assert_eq!(MediaType::from_mime("IMAGE/PNG"), MediaType::Png);
        assert_eq!(MediaType::from_mime("image/webp; q=1"), MediaType::Webp);
        assert_eq!(MediaType::from_mime("application/octet-stream"), MediaType::Jpeg);
        assert_eq!(MediaType::from_mime(""), MediaType::Jpeg);
    }

    #[test]
    fn path_guess() {
        assert_eq!(MediaType::from_path(Path::new("inv/March.PDF")), MediaType::Pdf);
        assert_eq!(MediaType::from_path(Path::new("scan.png")), MediaType::Png);
        assert_eq!(MediaType::from_path(Path::new("noext")), MediaType::Jpeg);
    }

    #[test]
    fn only_pdf_is_a_document() {
        assert!(MediaType::Pdf.is_document());
        assert!(!MediaType::Jpeg.is_document());
        assert_eq!(
            serde_json::to_value(MediaType::Pdf).unwrap(),
            serde_json::json!("application/pdf")
        );
    }
}
