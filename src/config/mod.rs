use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::routing::RouterConfig;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read separately from [`Config::from_env`] so logging can be set up
    /// before configuration loading starts emitting events.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT").as_deref() {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// LLM backend settings. The API key is optional: without one, formats that
/// need a model (images, audio, OCR) fail per request instead of at startup.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub transcription_model: String,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("transcription_model", &self.transcription_model)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub max_file_size_mb: usize,
    pub max_concurrent_requests: usize,
    pub request_timeout_seconds: u64,
    pub ocr_concurrency: usize,
    /// Directory holding the pdfium library; `None` uses the system path.
    pub pdfium_library_path: Option<String>,
    /// Longest edge, in pixels, of a page rendered for OCR.
    pub ocr_max_pixels: u32,
    pub upload_dir: PathBuf,
    pub log_format: LogFormat,
    pub llm: LlmConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        // PORT takes precedence for hosted deployments
        let server_port = match env::var("PORT") {
            Ok(port) => port.parse::<u16>().context("Failed to parse PORT")?,
            Err(_) => Self::parse_env_var("SERVER_PORT", 5000)
                .context("Failed to parse SERVER_PORT")?,
        };

        let config = Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| {
                info!("SERVER_HOST not set, using default: 0.0.0.0");
                "0.0.0.0".to_string()
            }),
            server_port,
            max_file_size_mb: Self::parse_env_var("MAX_FILE_SIZE_MB", 25)
                .context("Failed to parse MAX_FILE_SIZE_MB")?,
            max_concurrent_requests: Self::parse_env_var("MAX_CONCURRENT_REQUESTS", 16)
                .context("Failed to parse MAX_CONCURRENT_REQUESTS")?,
            request_timeout_seconds: Self::parse_env_var("REQUEST_TIMEOUT_SECONDS", 300)
                .context("Failed to parse REQUEST_TIMEOUT_SECONDS")?,
            ocr_concurrency: Self::parse_env_var("OCR_CONCURRENCY", 3)
                .context("Failed to parse OCR_CONCURRENCY")?,
            pdfium_library_path: env::var("PDFIUM_LIBRARY_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            ocr_max_pixels: Self::parse_env_var("OCR_MAX_PIXELS", 2000)
                .context("Failed to parse OCR_MAX_PIXELS")?,
            upload_dir: PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into())),
            log_format: LogFormat::from_env(),
            llm: LlmConfig {
                api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                transcription_model: env::var("TRANSCRIPTION_MODEL")
                    .unwrap_or_else(|_| "whisper-1".to_string()),
            },
        };

        config.validate()?;

        if config.llm.api_key.is_none() {
            warn!("OPENAI_API_KEY not set; image, audio and OCR conversions will fail");
        }

        info!("Configuration loaded successfully: {:?}", config);
        Ok(config)
    }

    fn parse_env_var<T>(var_name: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Debug,
        T::Err: std::fmt::Display,
    {
        match env::var(var_name) {
            Ok(val) => match val.parse() {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {} (using default: {:?})", var_name, e, default);
                    Ok(default)
                }
            },
            Err(_) => {
                info!("{} not set, using default: {:?}", var_name, default);
                Ok(default)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(anyhow::anyhow!("SERVER_PORT must be greater than 0"));
        }
        if self.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(anyhow::anyhow!("MAX_CONCURRENT_REQUESTS must be greater than 0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("REQUEST_TIMEOUT_SECONDS must be greater than 0"));
        }
        if self.ocr_concurrency == 0 {
            return Err(anyhow::anyhow!("OCR_CONCURRENCY must be greater than 0"));
        }
        if self.ocr_max_pixels == 0 {
            return Err(anyhow::anyhow!("OCR_MAX_PIXELS must be greater than 0"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("LLM_MODEL must not be empty"));
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "OPENAI_BASE_URL must be an http(s) URL, got '{}'",
                self.llm.base_url
            ));
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            ocr_concurrency: self.ocr_concurrency,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 5000,
            max_file_size_mb: 25,
            max_concurrent_requests: 16,
            request_timeout_seconds: 300,
            ocr_concurrency: 3,
            pdfium_library_path: None,
            ocr_max_pixels: 2000,
            upload_dir: PathBuf::from("uploads"),
            log_format: LogFormat::Pretty,
            llm: LlmConfig {
                api_key: None,
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                model: "gpt-4o-mini".to_string(),
                transcription_model: "whisper-1".to_string(),
            },
        }
    }
}
