//! Configuration loaded from the environment (and `.env`, via dotenvy).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::gemini::GeminiConfig;
use crate::speech_server::SpeechServerConfig;
use crate::story::StoryStyle;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub app_env: String,
    pub uploads_dir: PathBuf,
    pub story_style: StoryStyle,
    pub gemini: GeminiConfig,
    pub speech: SpeechServerConfig,
    pub extract_timeout: Duration,
    pub synth_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            app_env: "development".to_string(),
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            story_style: StoryStyle::default(),
            gemini: GeminiConfig::default(),
            speech: SpeechServerConfig::default(),
            extract_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
            synth_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or blank keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let timeout = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match get(key) {
                Some(raw) => {
                    let secs: u64 = parse(key, &raw)?;
                    if secs == 0 {
                        return Err(ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: "must be at least 1 second".to_string(),
                        });
                    }
                    Ok(Duration::from_secs(secs))
                }
                None => Ok(default),
            }
        };

        Ok(Config {
            host: get("HOST").unwrap_or(defaults.host),
            port: get("PORT")
                .map(|raw| parse::<u16>("PORT", &raw))
                .transpose()?
                .unwrap_or(defaults.port),
            app_env: get("APP_ENV").unwrap_or(defaults.app_env),
            uploads_dir: get("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_dir),
            story_style: get("STORY_STYLE")
                .map(|raw| raw.parse::<StoryStyle>())
                .transpose()?
                .unwrap_or(defaults.story_style),
            gemini: GeminiConfig {
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or(defaults.gemini.model),
                base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini.base_url),
                prompt: get("CAPTION_PROMPT").unwrap_or(defaults.gemini.prompt),
            },
            speech: SpeechServerConfig {
                base_url: get("TTS_BASE_URL"),
                api_key: get("TTS_API_KEY"),
                model: get("TTS_MODEL").unwrap_or(defaults.speech.model),
                voice: get("TTS_VOICE").unwrap_or(defaults.speech.voice),
            },
            extract_timeout: timeout("EXTRACT_TIMEOUT_SECS", defaults.extract_timeout)?,
            synth_timeout: timeout("SYNTH_TIMEOUT_SECS", defaults.synth_timeout)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("`{raw}`: {e}"),
    })
}
