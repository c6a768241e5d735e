//! Lesson parameters: difficulty levels, output formats and cache keys
//!
//! These are the explicit inputs every tutor operation takes. Prompts and cache
//! keys are derived from them deterministically.

use std::fmt;

/// How deep an explanation should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    /// Simple terms and everyday examples
    #[default]
    Beginner,
    /// Technical details and practical applications
    Intermediate,
    /// Formulas and advanced concepts
    Advanced,
}

impl Difficulty {
    /// Returns a slice containing all difficulty levels, easiest first.
    pub fn all() -> &'static [Difficulty] {
        &[
            Difficulty::Beginner,
            Difficulty::Intermediate,
            Difficulty::Advanced,
        ]
    }

    /// Display name, also used as the last segment of cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }

    /// Parses a difficulty from a string (case-insensitive).
    ///
    /// Accepts the full names plus short aliases.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Difficulty> {
        match s.to_lowercase().trim() {
            "beginner" | "basic" | "b" => Some(Difficulty::Beginner),
            "intermediate" | "mid" | "i" => Some(Difficulty::Intermediate),
            "advanced" | "expert" | "a" => Some(Difficulty::Advanced),
            _ => None,
        }
    }

    /// Builds the explanation prompt for `topic` at this level.
    pub fn prompt(&self, topic: &str) -> String {
        match self {
            Difficulty::Beginner => {
                format!("Explain {topic} in simple terms, using everyday examples.")
            }
            Difficulty::Intermediate => {
                format!("Explain {topic} with technical details and practical applications.")
            }
            Difficulty::Advanced => format!(
                "Provide an in-depth explanation of {topic} with mathematical formulas and advanced concepts."
            ),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The kind of result the tutor should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Written explanation
    Text,
    /// Spoken explanation, as an audio URL
    Audio,
    /// Diagram, as an image URL
    Image,
    /// Animation, as a video URL
    Video,
}

impl OutputFormat {
    /// Returns a slice containing all output formats.
    pub fn all() -> &'static [OutputFormat] {
        &[
            OutputFormat::Text,
            OutputFormat::Audio,
            OutputFormat::Image,
            OutputFormat::Video,
        ]
    }

    /// Namespace tag that prefixes cache keys for this format.
    pub fn tag(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Audio => "audio",
            OutputFormat::Image => "image",
            OutputFormat::Video => "video",
        }
    }

    /// Parses an output format from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<OutputFormat> {
        match s.to_lowercase().trim() {
            "text" | "txt" => Some(OutputFormat::Text),
            "audio" | "speech" => Some(OutputFormat::Audio),
            "image" | "img" | "diagram" => Some(OutputFormat::Image),
            "video" | "animation" => Some(OutputFormat::Video),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Trims a topic and collapses runs of whitespace to a single space.
pub fn normalize_topic(topic: &str) -> String {
    topic.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the cache key for a request, e.g. `text_Bernoulli_Beginner`.
pub fn cache_key(format: OutputFormat, topic: &str, difficulty: Difficulty) -> String {
    format!("{}_{}_{}", format.tag(), normalize_topic(topic), difficulty.name())
}

/// Builds the prompt used for image generation.
pub fn image_prompt(topic: &str) -> String {
    format!("Technical diagram or visualization of {topic} in engineering context")
}

/// Builds the prompt used for video generation.
pub fn video_prompt(topic: &str, difficulty: Difficulty) -> String {
    format!(
        "Short animated explainer of {topic} in engineering context, pitched at {} level",
        difficulty.name().to_lowercase()
    )
}
