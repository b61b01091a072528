//! Deterministic pipelines and an in-process app for the HTTP tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use tempfile::TempDir;
use tower::ServiceExt;

use storylens::error::{PipelineError, PipelineKind};
use storylens::extract::{
    CaptionOutput, GeneratedText, ImageToTextLoader, ImageToTextPipeline, PipelineExtractor,
};
use storylens::orchestrator::StoryService;
use storylens::speech::{
    PipelineSynthesizer, SpeechOutput, TextToSpeechLoader, TextToSpeechPipeline,
};
use storylens::story::StoryStyle;
use storylens::upload::MediaStore;
use storylens::{create_router, AppState, Config};

pub const BOUNDARY: &str = "storylens-test-boundary";
pub const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

/// What the fake captioner answers.
#[derive(Clone)]
pub enum Caption {
    Text(&'static str),
    Fail(&'static str),
}

pub struct CaptionLoader {
    caption: Caption,
    load_delay: Duration,
    pub loads: AtomicUsize,
}

struct CaptionPipeline(Caption);

#[async_trait]
impl ImageToTextPipeline for CaptionPipeline {
    async fn run(&self, image: &Path) -> Result<CaptionOutput, PipelineError> {
        assert!(image.exists(), "extraction must see the stored image");
        match &self.0 {
            Caption::Text(text) => Ok(CaptionOutput::Candidates(vec![GeneratedText::new(*text)])),
            Caption::Fail(message) => Err(PipelineError::invocation(
                PipelineKind::ImageToText,
                *message,
            )),
        }
    }
}

#[async_trait]
impl ImageToTextLoader for CaptionLoader {
    async fn load(&self) -> Result<Arc<dyn ImageToTextPipeline>, PipelineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        Ok(Arc::new(CaptionPipeline(self.caption.clone())))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Speaks,
    Unavailable,
    Broken,
    Stalls,
}

pub struct SpeechLoader {
    voice: Voice,
    pub loads: AtomicUsize,
    pub heard: Arc<Mutex<Vec<String>>>,
}

struct SpeechPipeline {
    voice: Voice,
    heard: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TextToSpeechPipeline for SpeechPipeline {
    async fn run(&self, text: &str) -> Result<SpeechOutput, PipelineError> {
        self.heard.lock().unwrap().push(text.to_string());
        match self.voice {
            Voice::Broken => Err(PipelineError::invocation(
                PipelineKind::TextToSpeech,
                "vocoder exploded",
            )),
            Voice::Stalls => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(SpeechOutput::default())
            }
            _ => Ok(SpeechOutput {
                audio: Some(Bytes::from_static(WAV)),
            }),
        }
    }
}

#[async_trait]
impl TextToSpeechLoader for SpeechLoader {
    async fn load(&self) -> Result<Arc<dyn TextToSpeechPipeline>, PipelineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.voice == Voice::Unavailable {
            return Err(PipelineError::load(
                PipelineKind::TextToSpeech,
                "unsupported environment",
            ));
        }
        Ok(Arc::new(SpeechPipeline {
            voice: self.voice,
            heard: Arc::clone(&self.heard),
        }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub dir: TempDir,
    pub caption: Arc<CaptionLoader>,
    pub speech: Arc<SpeechLoader>,
}

pub struct TestAppBuilder {
    caption: Caption,
    voice: Voice,
    style: StoryStyle,
    load_delay: Duration,
    synth_timeout: Duration,
}

impl TestAppBuilder {
    pub fn caption(mut self, caption: Caption) -> Self {
        self.caption = caption;
        self
    }

    pub fn voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn style(mut self, style: StoryStyle) -> Self {
        self.style = style;
        self
    }

    pub fn slow_load(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn synth_timeout(mut self, timeout: Duration) -> Self {
        self.synth_timeout = timeout;
        self
    }

    pub async fn build(self) -> TestApp {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let uploads = dir.path().join("uploads");

        let caption = Arc::new(CaptionLoader {
            caption: self.caption,
            load_delay: self.load_delay,
            loads: AtomicUsize::new(0),
        });
        let speech = Arc::new(SpeechLoader {
            voice: self.voice,
            loads: AtomicUsize::new(0),
            heard: Arc::new(Mutex::new(Vec::new())),
        });

        let store = MediaStore::new(&uploads);
        store.ensure_dir().await.expect("Failed to create uploads dir");

        let service = StoryService::new(
            Arc::new(PipelineExtractor::new(caption.clone(), Duration::from_secs(5))),
            Arc::new(PipelineSynthesizer::new(speech.clone(), self.synth_timeout)),
            store,
            self.style,
        );
        let config = Config {
            uploads_dir: uploads,
            story_style: self.style,
            ..Config::default()
        };

        TestApp {
            router: create_router(AppState::new(config, service)),
            dir,
            caption,
            speech,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            caption: Caption::Text("a cat sitting on a chair"),
            voice: Voice::Speaks,
            style: StoryStyle::Plain,
            load_delay: Duration::ZERO,
            synth_timeout: Duration::from_secs(5),
        }
    }

    pub fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads())
            .expect("uploads dir readable")
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn heard(&self) -> Vec<String> {
        self.speech.heard.lock().unwrap().clone()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        (status, headers, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self.send(request).await;
        let json = serde_json::from_slice(&body).unwrap_or_else(|e| {
            panic!(
                "response was not JSON ({e}): {}",
                String::from_utf8_lossy(&body)
            )
        });
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

/// One multipart part.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn image(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "image",
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::post("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn png_upload() -> Request<Body> {
    upload_request(&[Part::image("cat.png", "image/png", &tiny_png())])
}

/// A real 2x2 PNG, ~70 bytes.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([30, 120, 200]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(
            &mut std::io::Cursor::new(&mut out),
            image::ImageOutputFormat::Png,
        )
        .unwrap();
    out
}
