//! Streaming response decoding
//!
//! The remote API streams results as newline-delimited JSON documents, optionally
//! framed as server-sent events. This module reassembles those lines from raw
//! body chunks, classifies each one and turns chat streams into a lazy
//! sequence of text deltas.

mod chunk;
mod decoder;
mod lines;

pub use chunk::{StreamChunk, Usage};
pub use decoder::{
    decode, decode_reader, decode_stream, decode_video, decode_video_stream, with_idle_timeout,
    Deltas,
};
pub use lines::LineBuffer;

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a decoded stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// A line was not valid JSON
    #[error("malformed stream chunk {line:?}: {source}")]
    MalformedChunk {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// Reading from a blocking line source failed
    #[error("failed to read stream: {0}")]
    Io(#[from] io::Error),

    /// The HTTP body failed mid-stream
    #[error("stream transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// No body chunk arrived within the idle limit
    #[error("stream stalled: no data for {0:?}")]
    Idle(Duration),
}
