//! Hosted inference API client
//!
//! This module sends explanation, speech, image and video requests to the
//! remote API and parses the responses into plain strings and URLs.

use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::TutorConfig;
use crate::stream::{decode_stream, decode_video_stream, with_idle_timeout, StreamError};

/// Text deltas of a streamed chat answer
pub type DeltaStream = BoxStream<'static, Result<String, StreamError>>;

/// Remote API endpoints, relative to the base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Speech,
    Image,
    Video,
}

impl Endpoint {
    /// Path of the endpoint under the base URL
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Chat => "/chat/completions",
            Endpoint::Speech => "/audio/speech",
            Endpoint::Image => "/images/generations",
            Endpoint::Video => "/videos/generations",
        }
    }
}

/// Errors that can occur when calling the remote API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request did not complete within the timeout
    #[error("request timed out")]
    Timeout,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(reqwest::Error),

    /// The API answered with a non-success status
    #[error("API returned HTTP {status}")]
    HttpError { status: u16 },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// A streamed response could not be decoded
    #[error("Failed to decode streamed response: {0}")]
    Stream(#[from] StreamError),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::RequestFailed(err)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Client for the hosted inference API
#[derive(Debug, Clone)]
pub struct TutorClient {
    client: Client,
    config: TutorConfig,
}

impl TutorClient {
    /// Create a new TutorClient from configuration
    pub fn new(config: TutorConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Create a new TutorClient with a custom HTTP client
    pub fn with_client(client: Client, config: TutorConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.config.base_url, endpoint.path())
    }

    /// Sends a JSON POST and fails on any non-success status
    ///
    /// A plain request must finish within the configured timeout. A streaming
    /// request must produce its response headers within it; the body is then
    /// bounded per chunk by [`with_idle_timeout`].
    async fn post<T: Serialize>(
        &self,
        endpoint: Endpoint,
        body: &T,
        streaming: bool,
    ) -> Result<Response, ApiError> {
        let url = self.url(endpoint);
        debug!(%url, streaming, "sending API request");

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body);

        let response = if streaming {
            tokio::time::timeout(self.config.timeout, request.send())
                .await
                .map_err(|_| ApiError::Timeout)??
        } else {
            request.timeout(self.config.timeout).send().await?
        };
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpError {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Fetch a complete chat answer for `prompt`
    ///
    /// # Returns
    /// * `Ok(String)` - The content of the first choice
    /// * `Err(ApiError)` - If the request or parsing fails
    pub async fn chat(&self, prompt: &str) -> Result<String, ApiError> {
        let request = self.chat_request(prompt, false);
        let response = self.post(Endpoint::Chat, &request, false).await?;
        let text = response.text().await?;
        parse_chat_response(&text)
    }

    /// Start a streamed chat answer for `prompt`
    ///
    /// The returned stream yields text deltas as they arrive; the connection
    /// is closed when the stream is dropped.
    pub async fn chat_stream(&self, prompt: &str) -> Result<DeltaStream, ApiError> {
        let request = self.chat_request(prompt, true);
        let response = self.post(Endpoint::Chat, &request, true).await?;
        let body = with_idle_timeout(response.bytes_stream(), self.config.timeout);
        Ok(decode_stream(body).boxed())
    }

    /// Synthesize speech for `text` and return the audio URL
    pub async fn speech(&self, text: &str) -> Result<String, ApiError> {
        let request = SpeechRequest {
            text,
            voice: &self.config.voice,
        };
        let response = self.post(Endpoint::Speech, &request, false).await?;
        let text = response.text().await?;
        parse_speech_response(&text)
    }

    /// Generate an image for `prompt` and return its URL
    pub async fn image(&self, prompt: &str) -> Result<String, ApiError> {
        let request = GenerationRequest {
            prompt,
            stream: false,
        };
        let response = self.post(Endpoint::Image, &request, false).await?;
        let text = response.text().await?;
        parse_image_response(&text)
    }

    /// Generate a video for `prompt`
    ///
    /// The API streams progress lines; the first line with a `data` field
    /// carries the result and ends the request.
    ///
    /// # Returns
    /// * `Ok(Some(url))` - The video URL
    /// * `Ok(None)` - The stream ended without a result
    /// * `Err(ApiError)` - If the request or stream decoding fails
    pub async fn video(&self, prompt: &str) -> Result<Option<String>, ApiError> {
        let request = GenerationRequest {
            prompt,
            stream: true,
        };
        let response = self.post(Endpoint::Video, &request, true).await?;
        let body = with_idle_timeout(response.bytes_stream(), self.config.timeout);
        Ok(decode_video_stream(body).await?)
    }

    fn chat_request<'a>(&'a self, prompt: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.chat_model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        }
    }
}

fn parse_chat_response(body: &str) -> Result<String, ApiError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ApiError::MissingField("choices[0].message.content".to_string()))
}

fn parse_speech_response(body: &str) -> Result<String, ApiError> {
    let response: SpeechResponse = serde_json::from_str(body)?;
    response
        .url
        .ok_or_else(|| ApiError::MissingField("url".to_string()))
}

fn parse_image_response(body: &str) -> Result<String, ApiError> {
    let response: ImageResponse = serde_json::from_str(body)?;
    response
        .data
        .into_iter()
        .next()
        .and_then(|image| image.url)
        .ok_or_else(|| ApiError::MissingField("data[0].url".to_string()))
}
