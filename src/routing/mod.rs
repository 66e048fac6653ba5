//! Content routing: content type -> format family -> prompt -> strategy.

pub mod formats;
pub mod prompts;
pub mod strategy;

pub use formats::{
    classify, content_type_for_file_name, extension_for, extension_for_format, FormatRule,
    FORMAT_RULES,
};
pub use prompts::prompt_for;
pub use strategy::{select_strategy, Strategy};

use tracing::debug;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Page-level parallelism handed to the OCR helper.
    pub ocr_concurrency: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { ocr_concurrency: 3 }
    }
}

/// Everything needed to run one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub format: &'static str,
    pub prompt: &'static str,
    pub strategy: Strategy,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContentRouter {
    config: RouterConfig,
}

impl ContentRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn route(&self, content_type: &str, ocr_requested: bool) -> AppResult<RoutePlan> {
        let (supported, format) = classify(content_type);
        if !supported {
            return Err(AppError::UnsupportedFormat {
                content_type: content_type.to_string(),
            });
        }

        let plan = RoutePlan {
            format,
            prompt: prompt_for(format),
            strategy: select_strategy(format, ocr_requested),
            concurrency: self.config.ocr_concurrency,
        };

        debug!(
            content_type = content_type,
            format = plan.format,
            strategy = ?plan.strategy,
            "Routed content"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_pdf_to_paged_ocr_with_concurrency_hint() {
        let router = ContentRouter::new(RouterConfig { ocr_concurrency: 5 });
        let plan = router.route("application/pdf", true).unwrap();
        assert_eq!(plan.format, "pdf");
        assert_eq!(plan.strategy, Strategy::PagedOcrConvert);
        assert_eq!(plan.concurrency, 5);
        assert!(plan.prompt.contains("Convert the following PDF page to markdown"));
    }

    #[test]
    fn rejects_unknown_content_type() {
        let router = ContentRouter::default();
        match router.route("text/unknown-x", true) {
            Err(AppError::UnsupportedFormat { content_type }) => {
                assert_eq!(content_type, "text/unknown-x")
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }
}
