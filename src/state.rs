//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::extract::PipelineExtractor;
use crate::gemini::GeminiLoader;
use crate::orchestrator::StoryService;
use crate::speech::PipelineSynthesizer;
use crate::speech_server::SpeechServerLoader;
use crate::upload::MediaStore;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StoryService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, service: StoryService) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }

    /// Wire the Gemini captioner and the speech server behind their lazy
    /// adapters. Nothing is contacted until the first upload arrives.
    pub fn from_config(config: Config) -> Self {
        let extractor = PipelineExtractor::new(
            Arc::new(GeminiLoader::new(config.gemini.clone())),
            config.extract_timeout,
        );
        let synthesizer = PipelineSynthesizer::new(
            Arc::new(SpeechServerLoader::new(config.speech.clone())),
            config.synth_timeout,
        );
        let service = StoryService::new(
            Arc::new(extractor),
            Arc::new(synthesizer),
            MediaStore::new(config.uploads_dir.clone()),
            config.story_style,
        );
        Self::new(config, service)
    }
}
