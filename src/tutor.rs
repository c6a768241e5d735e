//! Get-or-fetch orchestration of cache, API client and stream decoder
//!
//! Every operation follows the same pattern: build the cache key from the
//! request parameters, return a fresh cached value if there is one, otherwise
//! call the API and remember the result.

use futures::StreamExt;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, TutorClient};
use crate::cache::{Clock, ExpiringCache, SystemClock};
use crate::lesson::{
    cache_key, image_prompt, normalize_topic, video_prompt, Difficulty, OutputFormat,
};
use crate::stream::StreamError;

/// Errors that can occur while producing an explanation
#[derive(Debug, Error)]
pub enum TutorError {
    /// The topic was empty after trimming
    #[error("Please enter a topic.")]
    EmptyTopic,

    /// The remote call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A streamed answer broke off or was malformed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The consumer of streamed text could not take more output
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// A produced explanation, ready to be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Written explanation
    Text(String),
    /// URL of a spoken explanation
    Audio(String),
    /// URL of a diagram
    Image(String),
    /// URL of an animation
    Video(String),
}

/// Explains topics in several formats, caching every result
#[derive(Debug)]
pub struct Tutor<C: Clock = SystemClock> {
    client: TutorClient,
    cache: ExpiringCache<C>,
}

impl<C: Clock> Tutor<C> {
    pub fn new(client: TutorClient, cache: ExpiringCache<C>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &ExpiringCache<C> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ExpiringCache<C> {
        &mut self.cache
    }

    /// Produces `format` for `topic`
    ///
    /// # Returns
    /// * `Ok(Some(Output))` with the result, cached or fresh
    /// * `Ok(None)` if a video stream finished without a result
    /// * `Err(TutorError)` if the topic is empty or the remote call fails
    pub async fn generate(
        &mut self,
        format: OutputFormat,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<Option<Output>, TutorError> {
        let output = match format {
            OutputFormat::Text => Some(Output::Text(self.explain(topic, difficulty).await?)),
            OutputFormat::Audio => Some(Output::Audio(self.narrate(topic, difficulty).await?)),
            OutputFormat::Image => Some(Output::Image(self.visualize(topic, difficulty).await?)),
            OutputFormat::Video => self.animate(topic, difficulty).await?.map(Output::Video),
        };
        Ok(output)
    }

    /// Written explanation of `topic`
    pub async fn explain(
        &mut self,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<String, TutorError> {
        let topic = checked_topic(topic)?;
        let key = cache_key(OutputFormat::Text, &topic, difficulty);
        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }

        let explanation = self.client.chat(&difficulty.prompt(&topic)).await?;
        self.remember(&key, &explanation);
        Ok(explanation)
    }

    /// Written explanation of `topic`, handing each text delta to `on_delta`
    /// as it arrives
    ///
    /// A cached explanation is handed over in one piece. If `on_delta` fails,
    /// the stream is dropped and the error returned as [`TutorError::Output`].
    /// A stream that stops part way for any reason is not cached.
    pub async fn explain_streaming<F>(
        &mut self,
        topic: &str,
        difficulty: Difficulty,
        mut on_delta: F,
    ) -> Result<String, TutorError>
    where
        F: FnMut(&str) -> io::Result<()>,
    {
        let topic = checked_topic(topic)?;
        let key = cache_key(OutputFormat::Text, &topic, difficulty);
        if let Some(cached) = self.cached(&key) {
            on_delta(cached.as_str())?;
            return Ok(cached);
        }

        let mut deltas = self.client.chat_stream(&difficulty.prompt(&topic)).await?;
        let mut explanation = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            on_delta(delta.as_str())?;
            explanation.push_str(&delta);
        }

        self.remember(&key, &explanation);
        Ok(explanation)
    }

    /// URL of a spoken explanation of `topic`
    pub async fn narrate(
        &mut self,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<String, TutorError> {
        let topic = checked_topic(topic)?;
        let key = cache_key(OutputFormat::Audio, &topic, difficulty);
        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }

        let url = self.client.speech(&difficulty.prompt(&topic)).await?;
        self.remember(&key, &url);
        Ok(url)
    }

    /// URL of a diagram of `topic`
    pub async fn visualize(
        &mut self,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<String, TutorError> {
        let topic = checked_topic(topic)?;
        let key = cache_key(OutputFormat::Image, &topic, difficulty);
        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }

        let url = self.client.image(&image_prompt(&topic)).await?;
        self.remember(&key, &url);
        Ok(url)
    }

    /// URL of an animation of `topic`, if the API produced one
    pub async fn animate(
        &mut self,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<Option<String>, TutorError> {
        let topic = checked_topic(topic)?;
        let key = cache_key(OutputFormat::Video, &topic, difficulty);
        if let Some(cached) = self.cached(&key) {
            return Ok(Some(cached));
        }

        let url = self.client.video(&video_prompt(&topic, difficulty)).await?;
        match &url {
            Some(url) => self.remember(&key, url),
            None => info!(%topic, "video stream ended without a result"),
        }
        Ok(url)
    }

    /// Fresh, non-empty cached string under `key`
    fn cached(&self, key: &str) -> Option<String> {
        let value: String = self.cache.get_as(key)?;
        if value.is_empty() {
            return None;
        }
        debug!(key, "cache hit");
        Some(value)
    }

    /// Stores a fetched value; a failed write is logged and otherwise ignored
    fn remember(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        if let Err(e) = self.cache.put(key, &value) {
            warn!(key, error = %e, "failed to persist cached response");
        }
    }
}

fn checked_topic(topic: &str) -> Result<String, TutorError> {
    let topic = normalize_topic(topic);
    if topic.is_empty() {
        Err(TutorError::EmptyTopic)
    } else {
        Ok(topic)
    }
}
