//! Client for the hosted inference API
//!
//! Wraps the chat, speech, image and video endpoints behind a single
//! `TutorClient`. Failures of any kind surface as `ApiError`; the client never
//! retries.

mod client;

pub use client::{ApiError, DeltaStream, Endpoint, TutorClient};
