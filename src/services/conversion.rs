use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{ConversionRequest, ConversionResult};
use crate::routing::{
    content_type_for_file_name, extension_for, extension_for_format, ContentRouter, RoutePlan,
    Strategy,
};
use crate::services::converter::{DocumentConverter, MarkdownConverter};
use crate::services::llm::{LlmClient, OpenAiClient};
use crate::services::ocr::{PageRasterizer, PagedOcr, VisionPageOcr};
use crate::services::upload::StagedUpload;

/// Runs one request end to end: validate, route, stage the payload on
/// disk, call the collaborator under a deadline, clean up.
pub struct ConversionService {
    router: ContentRouter,
    converter: Arc<dyn DocumentConverter>,
    ocr: Arc<dyn PagedOcr>,
    model: String,
    upload_dir: PathBuf,
    timeout: Duration,
}

impl ConversionService {
    pub fn new(
        config: &Config,
        converter: Arc<dyn DocumentConverter>,
        ocr: Arc<dyn PagedOcr>,
    ) -> Self {
        Self {
            router: ContentRouter::new(config.router_config()),
            converter,
            ocr,
            model: config.llm.model.clone(),
            upload_dir: config.upload_dir.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// Wire up the OpenAI-backed converter and OCR helper.
    pub fn from_config(config: &Config) -> Self {
        let llm: Option<Arc<dyn LlmClient>> = OpenAiClient::from_config(&config.llm)
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);
        let converter = Arc::new(MarkdownConverter::new(llm.clone(), config.llm.model.clone()));
        let rasterizer =
            PageRasterizer::new(config.pdfium_library_path.clone(), config.ocr_max_pixels);
        let ocr = Arc::new(VisionPageOcr::new(llm, rasterizer));
        Self::new(config, converter, ocr)
    }

    pub async fn convert(&self, request: ConversionRequest) -> AppResult<ConversionResult> {
        let start = Instant::now();

        if request.data.is_empty() {
            return Err(AppError::NoData);
        }

        let plan = self
            .router
            .route(&request.content_type, request.ocr_requested)?;

        let extension = staging_extension(&request, &plan);
        let staged = StagedUpload::write(&self.upload_dir, extension, request.data.clone()).await?;

        info!(
            format = plan.format,
            strategy = ?plan.strategy,
            size = request.size(),
            "Starting conversion"
        );

        let outcome = tokio::time::timeout(self.timeout, async {
            match plan.strategy {
                Strategy::PagedOcrConvert => self
                    .ocr
                    .run(staged.path(), &self.model, plan.prompt, plan.concurrency)
                    .await
                    .map(|output| output.joined()),
                Strategy::DirectConvert => self
                    .converter
                    .convert(staged.path(), Some(plan.prompt))
                    .await
                    .map(|document| document.text_content),
            }
        })
        .await;

        drop(staged);

        let content = match outcome {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        info!(
            format = plan.format,
            chars = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Conversion completed"
        );

        let result = ConversionResult::new(content, plan.format);
        Ok(if plan.strategy.uses_ocr() {
            result.with_ocr()
        } else {
            result
        })
    }
}

/// Declared content type first, then the uploaded file name, then the
/// format's canonical extension.
fn staging_extension(request: &ConversionRequest, plan: &RoutePlan) -> &'static str {
    let from_content_type = extension_for(&request.content_type);
    if !from_content_type.is_empty() {
        return from_content_type;
    }

    let from_file_name = request
        .file_name
        .as_deref()
        .and_then(content_type_for_file_name)
        .map(extension_for)
        .unwrap_or("");
    let extension = if from_file_name.is_empty() {
        extension_for_format(plan.format)
    } else {
        from_file_name
    };
    debug!(
        content_type = %request.content_type,
        extension = extension,
        "Content type has no registered extension"
    );
    extension
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(format: &'static str) -> RoutePlan {
        ContentRouter::default()
            .route(
                crate::routing::FORMAT_RULES
                    .iter()
                    .find(|r| r.id == format)
                    .unwrap()
                    .mime_prefixes[0],
                false,
            )
            .unwrap()
    }

    #[test]
    fn extension_prefers_content_type() {
        let request = ConversionRequest::new("image/png", &b"x"[..]).with_file_name("photo.jpg");
        assert_eq!(staging_extension(&request, &plan("image")), ".png");
    }

    #[test]
    fn extension_falls_back_to_file_name_then_format() {
        let request = ConversionRequest::new("image/pngx", &b"x"[..]).with_file_name("photo.webp");
        assert_eq!(staging_extension(&request, &plan("image")), ".webp");

        let request = ConversionRequest::new("image/pngx", &b"x"[..]);
        assert_eq!(staging_extension(&request, &plan("image")), ".jpg");
    }
}
