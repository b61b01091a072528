//! Image-to-text extraction.
//!
//! [`TextExtractor`] is the capability the orchestrator depends on.
//! [`PipelineExtractor`] implements it on top of any lazily loaded
//! [`ImageToTextPipeline`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ExtractionError, PipelineError, PipelineKind};
use crate::pipeline::{LazyPipeline, OnLoadFailure, PipelineStatus};

/// One generated caption or transcription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedText {
    pub generated_text: String,
}

impl GeneratedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            generated_text: text.into(),
        }
    }
}

/// Raw pipeline output. Some backends return ranked candidates, others a
/// single result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CaptionOutput {
    Candidates(Vec<GeneratedText>),
    Single(GeneratedText),
}

impl CaptionOutput {
    /// The first candidate's text, if there is one.
    pub fn into_text(self) -> Option<String> {
        match self {
            CaptionOutput::Candidates(candidates) => candidates
                .into_iter()
                .next()
                .map(|candidate| candidate.generated_text),
            CaptionOutput::Single(result) => Some(result.generated_text),
        }
    }
}

/// Text pulled out of an image. Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(String);

impl ExtractedText {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait ImageToTextPipeline: Send + Sync {
    async fn run(&self, image: &Path) -> Result<CaptionOutput, PipelineError>;
}

/// Builds an [`ImageToTextPipeline`]. May be slow (model weights, remote
/// handshakes), which is why it is only called once.
#[async_trait]
pub trait ImageToTextLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ImageToTextPipeline>, PipelineError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, image: &Path) -> Result<ExtractedText, ExtractionError>;

    fn status(&self) -> PipelineStatus;
}

pub struct PipelineExtractor {
    loader: Arc<dyn ImageToTextLoader>,
    pipeline: LazyPipeline<dyn ImageToTextPipeline>,
    timeout: Duration,
}

impl PipelineExtractor {
    pub fn new(loader: Arc<dyn ImageToTextLoader>, timeout: Duration) -> Self {
        Self {
            loader,
            pipeline: LazyPipeline::new(PipelineKind::ImageToText, OnLoadFailure::Retry),
            timeout,
        }
    }
}

#[async_trait]
impl TextExtractor for PipelineExtractor {
    async fn extract(&self, image: &Path) -> Result<ExtractedText, ExtractionError> {
        let pipeline = self.pipeline.get_or_load(|| self.loader.load()).await?;

        debug!("Running image-to-text on {}", image.display());
        let output = tokio::time::timeout(self.timeout, pipeline.run(image))
            .await
            .map_err(|_| PipelineError::Timeout {
                kind: PipelineKind::ImageToText,
                after: self.timeout,
            })??;
        debug!("Image-to-text result: {:?}", output);

        let text = output
            .into_text()
            .and_then(ExtractedText::new)
            .ok_or(ExtractionError::Empty)?;
        info!("Extracted text: {}", text.as_str());
        Ok(text)
    }

    fn status(&self) -> PipelineStatus {
        self.pipeline.status()
    }
}
