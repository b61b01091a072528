//! Image captioning through Google Gemini's `generateContent` endpoint.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineKind};
use crate::extract::{CaptionOutput, GeneratedText, ImageToTextLoader, ImageToTextPipeline};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CAPTION_PROMPT: &str =
    "Describe this image in one or two sentences. If it contains written text, transcribe the text instead.";

const KIND: PipelineKind = PipelineKind::ImageToText;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub prompt: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            prompt: DEFAULT_CAPTION_PROMPT.to_string(),
        }
    }
}

pub struct GeminiLoader {
    config: GeminiConfig,
}

impl GeminiLoader {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ImageToTextLoader for GeminiLoader {
    async fn load(&self) -> Result<Arc<dyn ImageToTextPipeline>, PipelineError> {
        let api_key = self
            .config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PipelineError::load(KIND, "GEMINI_API_KEY is not set"))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::load(KIND, e.to_string()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        info!("Gemini captioner ready ({})", self.config.model);

        Ok(Arc::new(GeminiCaptioner {
            client,
            url,
            api_key,
            prompt: self.config.prompt.clone(),
        }))
    }
}

pub struct GeminiCaptioner {
    client: reqwest::Client,
    url: String,
    api_key: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_output(self) -> CaptionOutput {
        let candidates = self
            .candidates
            .into_iter()
            .map(|candidate| {
                let text = candidate
                    .content
                    .map(|content| {
                        content
                            .parts
                            .into_iter()
                            .filter_map(|part| part.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                GeneratedText::new(text.trim())
            })
            .collect();
        CaptionOutput::Candidates(candidates)
    }
}

/// Re-encode whatever the user uploaded as JPEG so the model always gets a
/// format it accepts.
fn encode_jpeg(data: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut jpeg_bytes = Vec::new();
    rgb.write_to(
        &mut std::io::Cursor::new(&mut jpeg_bytes),
        image::ImageOutputFormat::Jpeg(85),
    )?;
    Ok(jpeg_bytes)
}

/// Request failures end up in client-facing error details; never echo the URL.
fn transport_error(err: reqwest::Error) -> PipelineError {
    PipelineError::invocation(KIND, err.without_url().to_string())
}

#[async_trait]
impl ImageToTextPipeline for GeminiCaptioner {
    async fn run(&self, image: &Path) -> Result<CaptionOutput, PipelineError> {
        let data = tokio::fs::read(image)
            .await
            .map_err(|e| PipelineError::invocation(KIND, format!("reading image: {e}")))?;

        let jpeg_bytes = tokio::task::spawn_blocking(move || encode_jpeg(&data))
            .await
            .map_err(|e| PipelineError::invocation(KIND, e.to_string()))?
            .map_err(|e| PipelineError::invocation(KIND, format!("decoding image: {e}")))?;
        let image_base64 = general_purpose::STANDARD.encode(&jpeg_bytes);

        let payload = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": self.prompt },
                    {
                        "inline_data": {
                            "mime_type": "image/jpeg",
                            "data": image_base64
                        }
                    }
                ]
            }]
        });

        debug!("Sending caption request to Gemini");
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let response_text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let snippet: String = response_text.chars().take(500).collect();
            return Err(PipelineError::invocation(
                KIND,
                format!("API error {status}: {snippet}"),
            ));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| PipelineError::invocation(KIND, format!("bad response: {e}")))?;
        Ok(parsed.into_output())
    }
}
