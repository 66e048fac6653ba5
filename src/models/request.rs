use bytes::Bytes;
use serde::Deserialize;

/// Query string accepted by `POST /convert`.
#[derive(Debug, Default, Deserialize)]
pub struct ConvertParams {
    pub ocr: Option<String>,
}

impl ConvertParams {
    /// OCR defaults to on; any value other than "true" turns it off.
    pub fn ocr_requested(&self) -> bool {
        self.ocr
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true)
    }
}

/// One inbound conversion, discarded once the response is written.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub content_type: String,
    pub data: Bytes,
    pub file_name: Option<String>,
    pub ocr_requested: bool,
}

impl ConversionRequest {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
            file_name: None,
            ocr_requested: true,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_ocr(mut self, ocr_requested: bool) -> Self {
        self.ocr_requested = ocr_requested;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
