pub mod conversion;
pub mod converter;
pub mod html;
pub mod llm;
pub mod ocr;
pub mod office;
pub mod upload;

pub use conversion::ConversionService;
pub use converter::{ConvertedDocument, DocumentConverter, MarkdownConverter};
pub use llm::{ChatMessage, ChatRole, ImageData, LlmClient, OpenAiClient};
pub use ocr::{OcrOutput, OcrPage, PageRasterizer, PagedOcr, VisionPageOcr};
pub use upload::StagedUpload;
