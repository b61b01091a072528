//! Request orchestration: store the image, extract text, format the story,
//! narrate it.
//!
//! Extraction is a hard dependency and aborts the request. Narration is best
//! effort: [`StoryService::narrate`] is the one place its failures are
//! absorbed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoryError;
use crate::extract::TextExtractor;
use crate::pipeline::PipelineStatus;
use crate::speech::SpeechSynthesizer;
use crate::story::StoryStyle;
use crate::upload::{ImageCandidate, MediaStore, StoredFile, UploadedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intaking,
    Extracting,
    Formatting,
    Synthesizing,
    Responding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Intaking => "intaking",
            Stage::Extracting => "extracting",
            Stage::Formatting => "formatting",
            Stage::Synthesizing => "synthesizing",
            Stage::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Body of a successful `POST /api/upload`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub success: bool,
    pub story: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoryOutcome {
    pub story: String,
    pub image: UploadedImage,
    pub audio: Option<StoredFile>,
}

impl StoryOutcome {
    pub fn into_response(self) -> UploadResponse {
        UploadResponse {
            success: true,
            story: self.story,
            image: self.image.file.url(),
            audio: self.audio.map(|audio| audio.url()),
        }
    }
}

/// Pipeline state as reported by `/api/debug`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStatus {
    pub image_to_text: PipelineStatus,
    pub text_to_speech: PipelineStatus,
    pub uploads_dir: String,
    pub uploads_dir_exists: bool,
}

pub struct StoryService {
    extractor: Arc<dyn TextExtractor>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    store: MediaStore,
    style: StoryStyle,
}

impl StoryService {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store: MediaStore,
        style: StoryStyle,
    ) -> Self {
        Self {
            extractor,
            synthesizer,
            store,
            style,
        }
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub async fn debug_status(&self) -> DebugStatus {
        DebugStatus {
            image_to_text: self.extractor.status(),
            text_to_speech: self.synthesizer.status(),
            uploads_dir: self.store.dir().display().to_string(),
            uploads_dir_exists: self.store.dir_exists().await,
        }
    }

    /// Run one validated upload through every stage.
    pub async fn process(&self, candidate: ImageCandidate) -> Result<StoryOutcome, StoryError> {
        info!(stage = %Stage::Intaking, "storing upload");
        let image = self.store.save_image(&candidate).await?;

        info!(stage = %Stage::Extracting, file = %image.file.filename, "extracting text");
        let text = match self.extractor.extract(&image.file.path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(stage = %Stage::Extracting, "text extraction failed: {}", err);
                return Err(err.into());
            }
        };

        info!(stage = %Stage::Formatting, style = %self.style, "formatting story");
        let story = self.style.format(text.as_str());

        info!(stage = %Stage::Synthesizing, "generating audio");
        let audio = self.narrate(&story).await;

        info!(
            stage = %Stage::Responding,
            with_audio = audio.is_some(),
            "request completed"
        );
        Ok(StoryOutcome {
            story,
            image,
            audio,
        })
    }

    /// Synthesize and store narration. Every failure ends here as `None`.
    pub async fn narrate(&self, story: &str) -> Option<StoredFile> {
        let audio = match self.synthesizer.synthesize(story).await {
            Ok(audio) => audio,
            Err(err) => {
                warn!(stage = %Stage::Synthesizing, "continuing without audio: {}", err);
                return None;
            }
        };

        match self.store.save_audio(&audio).await {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(stage = %Stage::Synthesizing, "could not save audio, continuing without it: {}", err);
                None
            }
        }
    }
}
