//! Command-line interface parsing for the engineering tutor
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a validated `RunConfig`: the topic, difficulty, output formats and API
//! settings for a single run.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::{TutorConfig, DEFAULT_BASE_URL};
use crate::lesson::{normalize_topic, Difficulty, OutputFormat};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The given difficulty is not recognized
    #[error("Invalid difficulty: '{0}'. Valid difficulties: beginner, intermediate, advanced")]
    InvalidDifficulty(String),

    /// The given output format is not recognized
    #[error("Invalid format: '{0}'. Valid formats: text, audio, image, video")]
    InvalidFormat(String),

    /// The topic was empty or only whitespace
    #[error("Please enter a topic.")]
    EmptyTopic,
}

/// Engineering tutor - explain engineering concepts as text, audio, images or video
#[derive(Parser, Debug)]
#[command(name = "engtutor")]
#[command(about = "Explain engineering concepts through a hosted AI API")]
#[command(version)]
pub struct Cli {
    /// Engineering topic to explain, e.g. "Bernoulli's Principle"
    pub topic: String,

    /// Output format; repeat for several
    ///
    /// Valid formats: text, audio, image, video
    #[arg(short, long = "format", value_name = "FORMAT", default_value = "text")]
    pub formats: Vec<String>,

    /// Explanation difficulty: beginner, intermediate or advanced
    #[arg(short, long, value_name = "LEVEL", default_value = "beginner")]
    pub difficulty: String,

    /// Print text explanations as they are generated
    #[arg(long)]
    pub stream: bool,

    /// Location of the response cache document
    #[arg(long, value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    /// Drop expired cache entries before running
    #[arg(long)]
    pub purge_expired: bool,

    /// API key sent as a bearer token
    #[arg(long, env = "TUTOR_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    /// Base URL of the inference API
    #[arg(long, env = "TUTOR_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Request timeout in seconds; for streams, the longest wait between chunks
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,
}

/// Configuration derived from CLI arguments for a single run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Normalized topic
    pub topic: String,
    /// Requested difficulty
    pub difficulty: Difficulty,
    /// Requested formats, in order, without duplicates
    pub formats: Vec<OutputFormat>,
    /// Whether text is streamed as it arrives
    pub stream: bool,
    /// Explicit cache location, if any
    pub cache_file: Option<PathBuf>,
    /// Whether expired cache entries are purged first
    pub purge_expired: bool,
    /// API settings
    pub api: TutorConfig,
}

/// Parses a difficulty string argument into a Difficulty enum.
///
/// # Returns
/// * `Ok(Difficulty)` if the string matches a known level or alias
/// * `Err(CliError::InvalidDifficulty)` if the string doesn't match
pub fn parse_difficulty_arg(s: &str) -> Result<Difficulty, CliError> {
    Difficulty::from_str(s).ok_or_else(|| CliError::InvalidDifficulty(s.to_string()))
}

/// Parses an output format string argument into an OutputFormat enum.
pub fn parse_format_arg(s: &str) -> Result<OutputFormat, CliError> {
    OutputFormat::from_str(s).ok_or_else(|| CliError::InvalidFormat(s.to_string()))
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with validated settings
    /// * `Err(CliError)` if the topic is empty or a difficulty/format is unknown
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let topic = normalize_topic(&cli.topic);
        if topic.is_empty() {
            return Err(CliError::EmptyTopic);
        }

        let difficulty = parse_difficulty_arg(&cli.difficulty)?;

        let mut formats = Vec::new();
        for raw in &cli.formats {
            let format = parse_format_arg(raw)?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }

        let api = TutorConfig::new(cli.api_key.clone())
            .with_base_url(cli.base_url.clone())
            .with_timeout(Duration::from_secs(cli.timeout));

        Ok(RunConfig {
            topic,
            difficulty,
            formats,
            stream: cli.stream,
            cache_file: cli.cache_file.clone(),
            purge_expired: cli.purge_expired,
            api,
        })
    }
}
