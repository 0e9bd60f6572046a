//! Link metadata: extraction and the fetch cache
//!
//! Key features:
//! - Structured tags (`og:*`, `description`) with a plain `<title>` fallback
//! - Exact-URL cache with a fixed TTL (5 minutes by default)
//! - Failures are never cached, so the next mention retries
//! - Partial results survive: a failed image upload keeps title and description

mod cache;
mod extract;
mod types;

pub use cache::{CacheStats, FetchCache};
pub use extract::extract;
pub use types::{CacheEntry, FetchResult, FetchStatus, MetaTag, Metadata};
