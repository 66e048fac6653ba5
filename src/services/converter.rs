//! Document-to-markdown conversion, dispatched on file extension.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::html::html_to_markdown;
use super::llm::{ChatMessage, ImageData, LlmClient};
use super::office;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedDocument {
    pub text_content: String,
}

#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path, prompt: Option<&str>) -> Result<ConvertedDocument>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    LegacyOffice,
    Image,
    Audio,
    Html,
    PlainText,
}

impl SourceKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = match ext.as_str() {
            "pdf" => SourceKind::Pdf,
            "docx" => SourceKind::Docx,
            "pptx" => SourceKind::Pptx,
            "xlsx" => SourceKind::Xlsx,
            "doc" | "ppt" | "xls" => SourceKind::LegacyOffice,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tif" | "tiff" | "webp" => SourceKind::Image,
            "mp3" | "wav" | "ogg" | "m4a" | "aac" => SourceKind::Audio,
            "html" | "htm" => SourceKind::Html,
            "txt" | "csv" | "json" | "xml" | "md" => SourceKind::PlainText,
            _ => return None,
        };
        Some(kind)
    }
}

/// Converts local files to markdown. Formats that need a model (images,
/// audio) go through the optional [`LlmClient`].
pub struct MarkdownConverter {
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
}

impl MarkdownConverter {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    fn llm(&self) -> Result<&Arc<dyn LlmClient>> {
        self.llm
            .as_ref()
            .ok_or_else(|| anyhow!("LLM client not configured; set OPENAI_API_KEY"))
    }

    async fn read(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read '{}'", path.display()))
    }

    /// Run a blocking parser over the file's bytes on the blocking pool.
    async fn parse_blocking<F>(path: &Path, parse: F) -> Result<String>
    where
        F: FnOnce(&[u8]) -> Result<String> + Send + 'static,
    {
        let bytes = Self::read(path).await?;
        tokio::task::spawn_blocking(move || parse(&bytes))
            .await
            .context("Parser task panicked")?
    }

    async fn convert_pdf(path: &Path) -> Result<String> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text(&path)
                .map_err(|e| anyhow!("PDF text extraction failed: {}", e))
        })
        .await
        .context("PDF extraction task panicked")?
    }

    async fn convert_image(&self, path: &Path, prompt: Option<&str>) -> Result<String> {
        let llm = self.llm()?;
        let bytes = Self::read(path).await?;
        let image = tokio::task::spawn_blocking(move || prepare_image(&bytes))
            .await
            .context("Image preparation task panicked")??;

        let prompt = prompt.unwrap_or("Write a detailed caption for this image.");
        let messages = [ChatMessage::user_with_images(prompt, vec![image])];
        let description = llm.chat(&self.model, &messages).await?;

        Ok(format!("# Description:\n{}", description.trim()))
    }

    async fn convert_audio(&self, path: &Path, prompt: Option<&str>) -> Result<String> {
        let llm = self.llm()?;
        let bytes = Self::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();
        let mime_type = audio_mime_type(path);

        let transcript = llm.transcribe(bytes, &file_name, mime_type, prompt).await?;
        Ok(format!("### Audio Transcript:\n{}", transcript.trim()))
    }
}

#[async_trait]
impl DocumentConverter for MarkdownConverter {
    async fn convert(&self, path: &Path, prompt: Option<&str>) -> Result<ConvertedDocument> {
        let kind = SourceKind::from_path(path)
            .with_context(|| format!("No converter for '{}'", path.display()))?;
        debug!(path = %path.display(), kind = ?kind, "Converting document");

        let text_content = match kind {
            SourceKind::Pdf => Self::convert_pdf(path).await?,
            SourceKind::Docx => Self::parse_blocking(path, office::docx_to_markdown).await?,
            SourceKind::Pptx => Self::parse_blocking(path, office::pptx_to_markdown).await?,
            SourceKind::Xlsx => Self::parse_blocking(path, office::xlsx_to_markdown).await?,
            SourceKind::LegacyOffice => {
                bail!("Legacy binary Office formats are not supported; save as docx, pptx or xlsx")
            }
            SourceKind::Image => self.convert_image(path, prompt).await?,
            SourceKind::Audio => self.convert_audio(path, prompt).await?,
            SourceKind::Html => {
                let bytes = Self::read(path).await?;
                html_to_markdown(&String::from_utf8_lossy(&bytes))
            }
            SourceKind::PlainText => {
                let bytes = Self::read(path).await?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        info!(
            kind = ?kind,
            chars = text_content.len(),
            "Document converted"
        );
        Ok(ConvertedDocument { text_content })
    }
}

/// Vision endpoints accept png, jpeg, gif and webp; everything else is
/// re-encoded as PNG.
fn prepare_image(bytes: &[u8]) -> Result<ImageData> {
    let format = image::guess_format(bytes).context("Unrecognised image data")?;
    let passthrough = match format {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::WebP => Some("image/webp"),
        _ => None,
    };
    if let Some(mime) = passthrough {
        return Ok(ImageData::from_bytes(bytes, mime));
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .with_context(|| format!("Failed to decode {:?} image", format))?;
    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("Failed to re-encode image as PNG")?;
    debug!(from = ?format, bytes = png.len(), "Re-encoded image as PNG");
    Ok(ImageData::from_bytes(&png, "image/png"))
}

fn audio_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        _ => "audio/mpeg",
    }
}
