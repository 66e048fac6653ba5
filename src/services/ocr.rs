//! Page-by-page OCR through a vision model.
//!
//! Every page is rasterised with pdfium and sent as a PNG together with its
//! text layer. When the pdfium library cannot be loaded, the page's embedded
//! image XObjects are decoded instead. One chat request is issued per page
//! and the replies are returned in page order regardless of completion order.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::llm::{ChatMessage, ImageData, LlmClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrPage {
    pub page: u32,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrOutput {
    pub pages: Vec<OcrPage>,
}

impl OcrOutput {
    /// Non-empty page contents joined by blank lines, in page order.
    pub fn joined(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.content.as_str())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
pub trait PagedOcr: Send + Sync {
    async fn run(
        &self,
        path: &Path,
        model: &str,
        prompt: &str,
        concurrency: usize,
    ) -> Result<OcrOutput>;
}

/// Renders PDF pages to PNG through pdfium.
#[derive(Debug, Clone)]
pub struct PageRasterizer {
    library_dir: Option<String>,
    max_pixels: u32,
}

impl PageRasterizer {
    /// `library_dir` holds the pdfium shared library; `None` searches the
    /// system library path. `max_pixels` caps the longest rendered edge.
    pub fn new(library_dir: Option<String>, max_pixels: u32) -> Self {
        Self {
            library_dir,
            max_pixels,
        }
    }

    fn bind(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                dir.as_str(),
            ))?,
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }

    /// One PNG per page, or `None` when pdfium is unavailable or rejects
    /// the document.
    fn render(&self, bytes: &[u8]) -> Option<Vec<Vec<u8>>> {
        let pdfium = match self.bind() {
            Ok(pdfium) => pdfium,
            Err(e) => {
                warn!(error = ?e, "pdfium unavailable, using embedded page images");
                return None;
            }
        };
        match render_with(&pdfium, bytes, self.max_pixels) {
            Ok(pages) => Some(pages),
            Err(e) => {
                warn!(error = %e, "Page rendering failed, using embedded page images");
                None
            }
        }
    }
}

fn render_with(pdfium: &Pdfium, bytes: &[u8], max_pixels: u32) -> Result<Vec<Vec<u8>>> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| anyhow!("pdfium could not open the document: {:?}", e))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let pages = document.pages();
    let mut rendered = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| anyhow!("Failed to render page {}: {:?}", index + 1, e))?;
        let image = bitmap.as_image();
        debug!(
            page = index + 1,
            width = image.width(),
            height = image.height(),
            "Rendered page"
        );
        rendered.push(encode_png(&image)?);
    }
    Ok(rendered)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("Failed to encode page image")?;
    Ok(png)
}

/// What gets sent to the model for one page.
#[derive(Debug)]
struct PageInput {
    number: u32,
    text: String,
    images: Vec<ImageData>,
}

pub struct VisionPageOcr {
    llm: Option<Arc<dyn LlmClient>>,
    rasterizer: PageRasterizer,
}

impl VisionPageOcr {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, rasterizer: PageRasterizer) -> Self {
        Self { llm, rasterizer }
    }

    async fn process_page(
        llm: &Arc<dyn LlmClient>,
        model: &str,
        prompt: &str,
        total: usize,
        page: PageInput,
    ) -> Result<OcrPage> {
        if page.images.is_empty() && page.text.trim().is_empty() {
            warn!(page = page.number, "Page has no image and no text, skipping");
            return Ok(OcrPage {
                page: page.number,
                content: String::new(),
            });
        }

        let start = Instant::now();
        let mut text = format!("Page {} of {}", page.number, total);
        if !page.text.trim().is_empty() {
            text.push_str("\n\nText layer:\n");
            text.push_str(page.text.trim());
        }
        let image_count = page.images.len();

        let messages = [
            ChatMessage::system(prompt),
            ChatMessage::user_with_images(text, page.images),
        ];
        let content = llm
            .chat(model, &messages)
            .await
            .with_context(|| format!("OCR failed on page {}", page.number))?;

        debug!(
            page = page.number,
            images = image_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Page processed"
        );
        Ok(OcrPage {
            page: page.number,
            content,
        })
    }
}

#[async_trait]
impl PagedOcr for VisionPageOcr {
    async fn run(
        &self,
        path: &Path,
        model: &str,
        prompt: &str,
        concurrency: usize,
    ) -> Result<OcrOutput> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| anyhow!("LLM client not configured; set OPENAI_API_KEY"))?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let rasterizer = self.rasterizer.clone();
        let inputs = tokio::task::spawn_blocking(move || load_pages(&bytes, &rasterizer))
            .await
            .context("PDF page loading task panicked")??;

        let total = inputs.len();
        info!(pages = total, concurrency = concurrency, "Starting paged OCR");

        let pages: Vec<OcrPage> = stream::iter(
            inputs
                .into_iter()
                .map(|page| Self::process_page(llm, model, prompt, total, page)),
        )
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

        Ok(OcrOutput { pages })
    }
}

fn load_pages(bytes: &[u8], rasterizer: &PageRasterizer) -> Result<Vec<PageInput>> {
    let doc = Document::load_mem(bytes).context("Failed to parse PDF")?;
    let page_ids = doc.get_pages();
    if page_ids.is_empty() {
        return Err(anyhow!("PDF has no pages"));
    }

    let mut rendered = rasterizer.render(bytes);
    if let Some(pages) = &rendered {
        if pages.len() != page_ids.len() {
            warn!(
                rendered = pages.len(),
                expected = page_ids.len(),
                "Rendered page count mismatch, using embedded page images"
            );
            rendered = None;
        }
    }

    let mut inputs = Vec::with_capacity(page_ids.len());
    for (index, (number, page_id)) in page_ids.into_iter().enumerate() {
        let text = match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = number, error = %e, "No usable text layer");
                String::new()
            }
        };
        let images = match &rendered {
            Some(pages) => vec![ImageData::from_bytes(&pages[index], "image/png")],
            None => embedded_images(&doc, page_id),
        };
        inputs.push(PageInput {
            number,
            text,
            images,
        });
    }
    Ok(inputs)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// The page's resource dictionary, following `Parent` links for inherited
/// resources.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(doc, resources)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// How an image XObject's samples are stored.
#[derive(Debug, PartialEq, Eq)]
enum ImageEncoding {
    Jpeg,
    Flate,
    Raw,
    Unsupported(String),
}

fn image_encoding(dict: &Dictionary) -> Option<ImageEncoding> {
    let is_image = matches!(
        dict.get(b"Subtype").and_then(Object::as_name),
        Ok(name) if name == b"Image"
    );
    if !is_image {
        return None;
    }

    let filter = match dict.get(b"Filter") {
        Err(_) => return Some(ImageEncoding::Raw),
        Ok(Object::Name(name)) => Some(name.as_slice()),
        Ok(Object::Array(filters)) if filters.len() == 1 => filters[0].as_name().ok(),
        Ok(_) => None,
    };
    Some(match filter {
        Some(b"DCTDecode") => ImageEncoding::Jpeg,
        Some(b"FlateDecode") => ImageEncoding::Flate,
        Some(other) => ImageEncoding::Unsupported(String::from_utf8_lossy(other).into_owned()),
        None => ImageEncoding::Unsupported("filter chain".to_string()),
    })
}

/// Components per sample for the colour spaces that map onto `image` buffers.
fn color_components(doc: &Document, color_space: &Object) -> Option<u8> {
    match resolve(doc, color_space)? {
        Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceGray" | b"CalGray" => Some(1),
            _ => None,
        },
        Object::Array(parts) => match parts.first()?.as_name().ok()? {
            b"ICCBased" => {
                let profile = resolve(doc, parts.get(1)?)?.as_stream().ok()?;
                match profile.dict.get(b"N").and_then(Object::as_i64).ok()? {
                    1 => Some(1),
                    3 => Some(3),
                    _ => None,
                }
            }
            b"CalRGB" => Some(3),
            b"CalGray" => Some(1),
            _ => None,
        },
        _ => None,
    }
}

/// Re-encode 8-bit gray or RGB samples as PNG.
fn samples_to_png(doc: &Document, dict: &Dictionary, samples: &[u8]) -> Option<Vec<u8>> {
    let dimension = |key: &[u8]| -> Option<u32> {
        u32::try_from(dict.get(key).and_then(Object::as_i64).ok()?).ok()
    };
    let width = dimension(b"Width")?;
    let height = dimension(b"Height")?;
    let bits = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    let components = color_components(doc, dict.get(b"ColorSpace").ok()?)?;
    if bits != 8 {
        debug!(bits = bits, "Skipping image with unsupported bit depth");
        return None;
    }

    let needed = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(components as usize)?;
    if samples.len() < needed {
        debug!(
            needed = needed,
            actual = samples.len(),
            "Image samples shorter than declared size"
        );
        return None;
    }
    let samples = samples[..needed].to_vec();

    let image = match components {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, samples)?),
        _ => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, samples)?),
    };
    encode_png(&image).ok()
}

fn embedded_image(doc: &Document, stream: &Stream) -> Option<ImageData> {
    match image_encoding(&stream.dict)? {
        ImageEncoding::Jpeg => Some(ImageData::from_bytes(&stream.content, "image/jpeg")),
        ImageEncoding::Flate => {
            let samples = match stream.decompressed_content() {
                Ok(samples) => samples,
                Err(e) => {
                    debug!(error = %e, "Failed to inflate image stream");
                    return None;
                }
            };
            let png = samples_to_png(doc, &stream.dict, &samples)?;
            Some(ImageData::from_bytes(&png, "image/png"))
        }
        ImageEncoding::Raw => {
            let png = samples_to_png(doc, &stream.dict, &stream.content)?;
            Some(ImageData::from_bytes(&png, "image/png"))
        }
        ImageEncoding::Unsupported(filter) => {
            debug!(filter = %filter, "Skipping image with unsupported filter");
            None
        }
    }
}

/// Images drawn on a page (scanned documents embed one per page).
fn embedded_images(doc: &Document, page_id: ObjectId) -> Vec<ImageData> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x))
        .and_then(|x| x.as_dict().ok())
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, object)| resolve(doc, object)?.as_stream().ok())
        .filter_map(|stream| embedded_image(doc, stream))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use lopdf::content::{Content, Operation};
    use lopdf::dictionary;
    use std::io::Write;
    use std::time::Duration;

    /// Replies with the first line of the page message; earlier pages
    /// answer slower so completion order is reversed.
    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn chat(&self, _model: &str, messages: &[ChatMessage]) -> Result<String> {
            assert_eq!(messages[0].text, "ocr prompt");
            let first_line = messages[1].text.lines().next().unwrap_or("").to_string();
            let page: u64 = first_line
                .split_whitespace()
                .nth(1)
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40 / page.max(1))).await;
            Ok(first_line)
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _file_name: &str,
            _mime_type: &str,
            _prompt: Option<&str>,
        ) -> Result<String> {
            unreachable!("OCR never transcribes")
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn chat(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
            Err(anyhow!("upstream 503"))
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _file_name: &str,
            _mime_type: &str,
            _prompt: Option<&str>,
        ) -> Result<String> {
            unreachable!("OCR never transcribes")
        }
    }

    fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    /// Points at a directory without pdfium so the embedded-image path runs.
    fn offline_rasterizer() -> PageRasterizer {
        PageRasterizer::new(Some("/nonexistent/pdfium".to_string()), 2000)
    }

    /// Single page whose only content is a 16x16 red image, Flate-compressed.
    fn pdf_with_flate_image() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut red = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 16,
                "Height" => 16,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            [255u8, 0, 0].repeat(16 * 16),
        );
        red.compress().unwrap();
        assert_eq!(
            red.dict.get(b"Filter").and_then(Object::as_name).unwrap(),
            b"FlateDecode"
        );
        let image_id = doc.add_object(red);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![16.into(), 0.into(), 0.into(), 16.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn write_pdf(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[tokio::test]
    async fn pages_come_back_in_document_order() {
        let file = write_pdf(&pdf_with_pages(&["alpha", "beta", "gamma"]));
        let ocr = VisionPageOcr::new(Some(Arc::new(EchoLlm)), offline_rasterizer());

        let output = ocr.run(file.path(), "m", "ocr prompt", 3).await.unwrap();

        let numbers: Vec<u32> = output.pages.iter().map(|p| p.page).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(
            output.joined(),
            "Page 1 of 3\n\nPage 2 of 3\n\nPage 3 of 3"
        );
    }

    #[tokio::test]
    async fn a_failed_page_fails_the_run() {
        let file = write_pdf(&pdf_with_pages(&["alpha"]));
        let ocr = VisionPageOcr::new(Some(Arc::new(FailingLlm)), offline_rasterizer());

        let err = ocr.run(file.path(), "m", "ocr prompt", 3).await.unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("page 1"), "got: {chain}");
        assert!(chain.contains("upstream 503"), "got: {chain}");
    }

    #[tokio::test]
    async fn rejects_non_pdf_input() {
        let file = write_pdf(b"definitely not a pdf");
        let ocr = VisionPageOcr::new(Some(Arc::new(EchoLlm)), offline_rasterizer());
        assert!(ocr.run(file.path(), "m", "p", 1).await.is_err());
    }

    #[tokio::test]
    async fn blank_pages_are_skipped_without_a_model_call() {
        let file = write_pdf(&pdf_with_pages(&["", "beta"]));
        // only the second page may reach the model
        let ocr = VisionPageOcr::new(Some(Arc::new(EchoLlm)), offline_rasterizer());

        let output = ocr.run(file.path(), "m", "ocr prompt", 2).await.unwrap();

        assert_eq!(output.pages.len(), 2);
        assert_eq!(output.pages[0].content, "");
        assert_eq!(output.joined(), "Page 2 of 2");
    }

    #[test]
    fn text_only_pages_have_no_images() {
        let bytes = pdf_with_pages(&["alpha"]);
        let pages = load_pages(&bytes, &offline_rasterizer()).unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].images.is_empty());
        assert!(pages[0].text.contains("alpha"));
    }

    #[test]
    fn flate_images_are_decoded_to_png() {
        let pages = load_pages(&pdf_with_flate_image(), &offline_rasterizer()).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].images.len(), 1);
        let page_image = &pages[0].images[0];
        assert_eq!(page_image.mime_type, "image/png");

        let png = STANDARD.decode(&page_image.data).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert_eq!(decoded.get_pixel(3, 7).0, [255, 0, 0]);
    }

    #[test]
    fn image_encoding_detection() {
        let jpeg = dictionary! { "Subtype" => "Image", "Filter" => "DCTDecode" };
        let flate = dictionary! { "Subtype" => "Image", "Filter" => "FlateDecode" };
        let raw = dictionary! { "Subtype" => "Image" };
        let fax = dictionary! { "Subtype" => "Image", "Filter" => "CCITTFaxDecode" };
        let wrapped = dictionary! {
            "Subtype" => "Image",
            "Filter" => vec![Object::Name(b"DCTDecode".to_vec())],
        };
        let form = dictionary! { "Subtype" => "Form" };

        assert_eq!(image_encoding(&jpeg), Some(ImageEncoding::Jpeg));
        assert_eq!(image_encoding(&flate), Some(ImageEncoding::Flate));
        assert_eq!(image_encoding(&raw), Some(ImageEncoding::Raw));
        assert_eq!(
            image_encoding(&fax),
            Some(ImageEncoding::Unsupported("CCITTFaxDecode".to_string()))
        );
        assert_eq!(image_encoding(&wrapped), Some(ImageEncoding::Jpeg));
        assert_eq!(image_encoding(&form), None);
    }

    #[test]
    fn gray_samples_become_png() {
        let doc = Document::with_version("1.5");
        let dict = dictionary! {
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        };
        assert!(samples_to_png(&doc, &dict, &[0, 64, 128, 255]).is_some());
        assert!(samples_to_png(&doc, &dict, &[0, 64]).is_none());

        let cmyk = dictionary! {
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceCMYK",
            "BitsPerComponent" => 8,
        };
        assert!(samples_to_png(&doc, &cmyk, &[0, 0, 0, 0]).is_none());
    }
}
