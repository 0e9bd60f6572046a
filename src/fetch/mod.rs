//! Network access for link previews
//!
//! Everything the cache needs from the network goes through [`Fetcher`], so
//! the cache can be exercised without sockets.

mod http;
mod user_agent;

pub use http::HttpFetcher;
pub(crate) use http::{build_client, read_capped};
pub use user_agent::UserAgentPolicy;

use crate::error::FetchError;
use async_trait::async_trait;

/// Raw response of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    /// `Content-Type` header, verbatim
    pub content_type: Option<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`, failing with `Network`, `Timeout`, `BadStatus`, `TooLarge`
    /// or `ParseFailure` (unusable URL)
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}
