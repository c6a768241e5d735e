//! Classification of individual stream lines

use serde::Deserialize;
use serde_json::Value;

use super::StreamError;

/// Server-sent-event sentinel marking the end of a stream
const DONE_SENTINEL: &[u8] = b"[DONE]";

/// Token accounting reported at the end of a chat stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// One decoded line of a streamed response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A chat completion delta; `content` is empty when the delta carries none
    Delta { content: String },
    /// Usage metadata with no content to show
    Usage(Usage),
    /// A result line carrying `data[0].url`
    Data { url: Option<String> },
    /// The `[DONE]` end-of-stream marker
    Done,
    /// Valid JSON of a shape we do not act on
    Unrecognized(Value),
}

impl StreamChunk {
    /// Parses one raw line
    ///
    /// Returns `Ok(None)` for empty lines. A trailing `\r` and a leading
    /// `data:` field prefix (with one optional space) are removed first. Any
    /// other non-empty payload, whitespace included, must be JSON.
    ///
    /// # Returns
    /// * `Ok(Some(chunk))` for a line holding a JSON document or `[DONE]`
    /// * `Err(StreamError::MalformedChunk)` if the line is not valid JSON
    pub fn parse(line: &[u8]) -> Result<Option<Self>, StreamError> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let payload = match line.strip_prefix(b"data:") {
            Some(rest) => rest.strip_prefix(b" ").unwrap_or(rest),
            None => line,
        };
        if payload.is_empty() {
            return Ok(None);
        }
        if payload == DONE_SENTINEL {
            return Ok(Some(StreamChunk::Done));
        }

        let value: Value =
            serde_json::from_slice(payload).map_err(|source| StreamError::MalformedChunk {
                line: String::from_utf8_lossy(payload).into_owned(),
                source,
            })?;
        Ok(Some(Self::classify(value)))
    }

    /// Sorts a JSON document into one of the known chunk shapes
    pub fn classify(value: Value) -> Self {
        if let Some(choices) = value.get("choices").and_then(Value::as_array) {
            if let Some(first) = choices.first() {
                let content = first
                    .pointer("/delta/content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return StreamChunk::Delta { content };
            }
        }

        if value.get("data").is_some() {
            let url = value
                .pointer("/data/0/url")
                .and_then(Value::as_str)
                .map(str::to_string);
            return StreamChunk::Data { url };
        }

        if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
            return StreamChunk::Usage(Usage::deserialize(usage).unwrap_or_default());
        }

        StreamChunk::Unrecognized(value)
    }
}
