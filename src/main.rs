//! Engineering tutor - explain engineering concepts from the terminal
//!
//! Sends a topic to a hosted inference API and prints the explanation as
//! text, or links to the generated audio, image or video. Results are cached
//! on disk for 24 hours.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use engtutor::api::TutorClient;
use engtutor::cache::ExpiringCache;
use engtutor::cli::{Cli, RunConfig};
use engtutor::lesson::OutputFormat;
use engtutor::tutor::{Output, Tutor, TutorError};

/// Fallback cache location when no platform cache directory exists
const FALLBACK_CACHE_FILE: &str = "response_cache.json";

/// Sends log output to stderr so results on stdout stay clean.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Prints a finished result
fn render(out: &mut impl Write, output: &Output, topic: &str) -> io::Result<()> {
    match output {
        Output::Text(text) => writeln!(out, "{text}"),
        Output::Audio(url) => writeln!(out, "Audio explanation: {url}"),
        Output::Image(url) => writeln!(out, "Visualization of {topic}: {url}"),
        Output::Video(url) => writeln!(out, "Video explanation: {url}"),
    }
}

/// Streams a text explanation to stdout as it arrives
async fn stream_text(tutor: &mut Tutor, config: &RunConfig) -> Result<(), TutorError> {
    let mut stdout = io::stdout();
    tutor
        .explain_streaming(&config.topic, config.difficulty, |delta| {
            stdout.write_all(delta.as_bytes())?;
            stdout.flush()
        })
        .await?;
    writeln!(stdout)?;
    Ok(())
}

/// Produces one format, preceded by a header when several were requested
async fn produce(
    tutor: &mut Tutor,
    config: &RunConfig,
    index: usize,
) -> Result<(), TutorError> {
    let format = config.formats[index];
    let mut stdout = io::stdout();
    if config.formats.len() > 1 {
        if index > 0 {
            writeln!(stdout)?;
        }
        writeln!(stdout, "== {} ==", format)?;
    }

    if format == OutputFormat::Text && config.stream {
        return stream_text(tutor, config).await;
    }
    match tutor.generate(format, &config.topic, config.difficulty).await? {
        Some(output) => render(&mut stdout, &output, &config.topic)?,
        None => writeln!(stdout, "No {} result was produced.", format)?,
    }
    Ok(())
}

/// Produces every requested format, returning `false` if any failed
///
/// A failed write to stdout ends the run.
async fn run(config: RunConfig) -> bool {
    let mut cache = config
        .cache_file
        .clone()
        .map(ExpiringCache::open)
        .or_else(ExpiringCache::open_default)
        .unwrap_or_else(|| ExpiringCache::open(FALLBACK_CACHE_FILE));
    info!(path = %cache.path().display(), entries = cache.len(), "response cache loaded");

    if config.purge_expired {
        match cache.purge_expired() {
            Ok(removed) => info!(removed, "expired cache entries purged"),
            Err(e) => error!(error = %e, "failed to purge expired cache entries"),
        }
    }

    let mut tutor = Tutor::new(TutorClient::new(config.api.clone()), cache);
    let mut all_ok = true;

    for (index, format) in config.formats.iter().enumerate() {
        match produce(&mut tutor, &config, index).await {
            Ok(()) => {}
            Err(TutorError::Output(e)) => {
                error!(error = %e, "stdout closed, stopping");
                return false;
            }
            Err(e) => {
                eprintln!("Error generating {}: {}", format, e);
                all_ok = false;
            }
        }
    }

    all_ok
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let config = match RunConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    if run(config).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
