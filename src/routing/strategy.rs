/// How a classified payload gets converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Hand the whole file to the document converter.
    DirectConvert,
    /// Split into pages and run each page through the vision model.
    PagedOcrConvert,
}

impl Strategy {
    pub fn uses_ocr(self) -> bool {
        matches!(self, Strategy::PagedOcrConvert)
    }
}

/// Paged OCR is only used for PDFs, and only when the caller asked for it.
pub fn select_strategy(format_id: &str, ocr_requested: bool) -> Strategy {
    if format_id == "pdf" && ocr_requested {
        Strategy::PagedOcrConvert
    } else {
        Strategy::DirectConvert
    }
}
