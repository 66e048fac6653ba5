//! LLM backend used for image description, audio transcription and OCR.
//!
//! The [`LlmClient`] trait is the seam: [`OpenAiClient`] talks to any
//! OpenAI-compatible endpoint, tests plug in their own implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{multipart, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

impl ChatRole {
    fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
        }
    }
}

/// Base64 image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub data: String,
}

impl ImageData {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub images: Vec<ImageData>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageData>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            images,
        }
    }

    fn to_api(&self) -> Value {
        if self.images.is_empty() {
            return json!({ "role": self.role.as_str(), "content": self.text });
        }

        let mut parts = Vec::with_capacity(self.images.len() + 1);
        if !self.text.is_empty() {
            parts.push(json!({ "type": "text", "text": self.text }));
        }
        for image in &self.images {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": image.to_data_url(), "detail": "high" }
            }));
        }
        json!({ "role": self.role.as_str(), "content": parts })
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a chat completion and return the first choice's text.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Transcribe an audio file. `prompt` is passed through as a style hint.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        prompt: Option<&str>,
    ) -> Result<String>;
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        transcription_model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transcription_model: transcription_model.into(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        config.api_key.as_ref().map(|key| {
            Self::new(
                key.clone(),
                config.base_url.clone(),
                config.transcription_model.clone(),
            )
        })
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "{} request failed with status {}: {}",
            what,
            status,
            error_text
        ))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": model,
            "messages": messages.iter().map(ChatMessage::to_api).collect::<Vec<_>>(),
        });

        debug!(model = model, messages = messages.len(), "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        let parsed: ChatCompletionResponse = Self::check(response, "Chat completion")
            .await?
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .context("No choices in chat completion response")?
            .message
            .content
            .unwrap_or_default();

        debug!(
            model = model,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "Chat completion finished"
        );
        Ok(content)
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        prompt: Option<&str>,
    ) -> Result<String> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .context("Invalid audio MIME type")?;
        let mut form = multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);
        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }

        debug!(file_name = file_name, "Sending transcription request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?;

        let parsed: TranscriptionResponse = Self::check(response, "Transcription")
            .await?
            .json()
            .await
            .context("Failed to parse transcription response")?;
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_message_serialises_as_string_content() {
        let value = ChatMessage::system("be brief").to_api();
        assert_eq!(value["role"], "system");
        assert_eq!(value["content"], "be brief");
    }

    #[test]
    fn image_message_serialises_as_parts() {
        let image = ImageData::from_bytes(b"\xff\xd8\xff", "image/jpeg");
        let value = ChatMessage::user_with_images("Page 1", vec![image]).to_api();
        let parts = value["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OpenAiClient::new("k", "http://localhost:8080/v1/", "whisper-1");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }
}
