//! Engineering tutor library
//!
//! Exposes the response cache, stream decoder, API client and tutor
//! orchestration for use by the binary and integration tests.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod lesson;
pub mod stream;
pub mod tutor;
