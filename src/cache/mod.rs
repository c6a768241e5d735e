//! Cache module for storing API responses to disk
//!
//! This module provides an expiring key-value cache persisted as a single JSON
//! document. Entries are fresh for 24 hours; expired entries read as absent but
//! stay on disk until explicitly purged. A corrupt document is treated as an
//! empty cache rather than an error.

mod clock;
mod manager;

pub use clock::{to_unix_secs, Clock, ManualClock, SystemClock};
pub use manager::{default_path, CacheEntry, CacheError, ExpiringCache, TTL_SECS};
