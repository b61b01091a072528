//! Text-to-speech synthesis.
//!
//! Unlike extraction, a speech pipeline that cannot be constructed is
//! remembered as unavailable for the rest of the process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineKind, SynthesisError};
use crate::pipeline::{LazyPipeline, OnLoadFailure, PipelineStatus};

/// Characters of story text handed to the speech model.
pub const MAX_SPEECH_CHARS: usize = 500;

/// Raw pipeline output; `audio` is `None` when the backend produced nothing.
#[derive(Debug, Clone, Default)]
pub struct SpeechOutput {
    pub audio: Option<Bytes>,
}

#[async_trait]
pub trait TextToSpeechPipeline: Send + Sync {
    async fn run(&self, text: &str) -> Result<SpeechOutput, PipelineError>;
}

#[async_trait]
pub trait TextToSpeechLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn TextToSpeechPipeline>, PipelineError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Audio bytes for `text`, ready to be written out verbatim as a `.wav`.
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError>;

    fn status(&self) -> PipelineStatus;
}

/// First [`MAX_SPEECH_CHARS`] characters of `text`.
pub fn truncate_for_speech(text: &str) -> &str {
    match text.char_indices().nth(MAX_SPEECH_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub struct PipelineSynthesizer {
    loader: Arc<dyn TextToSpeechLoader>,
    pipeline: LazyPipeline<dyn TextToSpeechPipeline>,
    timeout: Duration,
}

impl PipelineSynthesizer {
    pub fn new(loader: Arc<dyn TextToSpeechLoader>, timeout: Duration) -> Self {
        Self {
            loader,
            pipeline: LazyPipeline::new(PipelineKind::TextToSpeech, OnLoadFailure::Remember),
            timeout,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for PipelineSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        let pipeline = self.pipeline.get_or_load(|| self.loader.load()).await?;

        let text = truncate_for_speech(text);
        debug!("TTS text length: {}", text.chars().count());

        let output = tokio::time::timeout(self.timeout, pipeline.run(text))
            .await
            .map_err(|_| PipelineError::Timeout {
                kind: PipelineKind::TextToSpeech,
                after: self.timeout,
            })??;

        match output.audio {
            Some(audio) if !audio.is_empty() => {
                info!("Synthesized {} bytes of audio", audio.len());
                Ok(audio)
            }
            _ => Err(SynthesisError::NoAudio),
        }
    }

    fn status(&self) -> PipelineStatus {
        self.pipeline.status()
    }
}
