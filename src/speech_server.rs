//! Speech synthesis through an OpenAI-compatible `/v1/audio/speech` server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineKind};
use crate::speech::{SpeechOutput, TextToSpeechLoader, TextToSpeechPipeline};

pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_TTS_VOICE: &str = "alloy";

const KIND: PipelineKind = PipelineKind::TextToSpeech;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SpeechServerConfig {
    /// Unset means the deployment has no speech backend.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
}

impl Default for SpeechServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_TTS_VOICE.to_string(),
        }
    }
}

pub struct SpeechServerLoader {
    config: SpeechServerConfig,
}

impl SpeechServerLoader {
    pub fn new(config: SpeechServerConfig) -> Self {
        Self { config }
    }
}

fn authorize(request: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}

#[async_trait]
impl TextToSpeechLoader for SpeechServerLoader {
    async fn load(&self) -> Result<Arc<dyn TextToSpeechPipeline>, PipelineError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PipelineError::load(KIND, "TTS_BASE_URL is not set"))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::load(KIND, e.to_string()))?;

        // The server must answer before we route stories to it.
        let probe = authorize(
            client.get(format!("{base_url}/v1/models")),
            self.config.api_key.as_deref(),
        )
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| PipelineError::load(KIND, e.to_string()))?;
        if !probe.status().is_success() {
            return Err(PipelineError::load(
                KIND,
                format!("speech server answered {}", probe.status()),
            ));
        }
        info!("Speech server ready at {} ({})", base_url, self.config.model);

        Ok(Arc::new(SpeechServerSynthesizer {
            client,
            url: format!("{base_url}/v1/audio/speech"),
            api_key: self.config.api_key.clone(),
            model: self.config.model.clone(),
            voice: self.config.voice.clone(),
        }))
    }
}

pub struct SpeechServerSynthesizer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[async_trait]
impl TextToSpeechPipeline for SpeechServerSynthesizer {
    async fn run(&self, text: &str) -> Result<SpeechOutput, PipelineError> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        };

        debug!("Requesting {} chars of speech", text.chars().count());
        let response = authorize(self.client.post(&self.url), self.api_key.as_deref())
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::invocation(KIND, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(500).collect();
            return Err(PipelineError::invocation(
                KIND,
                format!("speech server error {status}: {snippet}"),
            ));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| PipelineError::invocation(KIND, e.to_string()))?;

        Ok(SpeechOutput {
            audio: (!audio.is_empty()).then_some(audio),
        })
    }
}
