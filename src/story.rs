//! Turning extracted text into the story shown to the user.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Inputs shorter than this get terminal punctuation in [`StoryStyle::Plain`].
const SHORT_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoryStyle {
    /// The extracted text, trimmed, with a full stop added to short fragments.
    #[default]
    Plain,
    /// The extracted text set inside a fixed two-paragraph narrative.
    Narrative,
}

impl StoryStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStyle::Plain => "plain",
            StoryStyle::Narrative => "narrative",
        }
    }

    pub fn format(&self, text: &str) -> String {
        match self {
            StoryStyle::Plain => plain(text),
            StoryStyle::Narrative => narrative(text),
        }
    }
}

impl fmt::Display for StoryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(StoryStyle::Plain),
            "narrative" => Ok(StoryStyle::Narrative),
            other => Err(ConfigError::InvalidValue {
                key: "STORY_STYLE".to_string(),
                message: format!("expected `plain` or `narrative`, got `{other}`"),
            }),
        }
    }
}

fn ends_with_punctuation(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}

fn sentence(text: &str) -> String {
    if ends_with_punctuation(text) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}

fn plain(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() < SHORT_TEXT_CHARS {
        sentence(text)
    } else {
        text.to_string()
    }
}

fn narrative(text: &str) -> String {
    let text = text.trim();
    format!(
        "Once upon a time, a single photograph held a quiet secret. \
         Looking closely, you could make it out: {}\n\n\
         And so the moment was kept, a small story waiting for someone to \
         find it and read it aloud.",
        sentence(text)
    )
}
