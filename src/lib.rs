//! StoryLens: turn an uploaded photo into a short story with optional
//! narration.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod speech;
pub mod speech_server;
pub mod state;
pub mod story;
pub mod upload;

pub use api::create_router;
pub use config::Config;
pub use state::AppState;
