use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub content: String,
    pub format: String,
    /// Only present when the paged OCR path produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<bool>,
}

impl ConversionResult {
    pub fn new(content: String, format: impl Into<String>) -> Self {
        Self {
            content,
            format: format.into(),
            ocr: None,
        }
    }

    pub fn with_ocr(mut self) -> Self {
        self.ocr = Some(true);
        self
    }

    pub fn ocr_used(&self) -> bool {
        self.ocr.unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}
