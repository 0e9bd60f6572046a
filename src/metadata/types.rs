//! Metadata types for link previews

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::FetchError;

/// Human-readable metadata extracted from a fetched page.
///
/// Every field is optional: a page without a title or image is a normal
/// result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `og:type`, or the response MIME type when the page does not declare one
    pub content_type: Option<String>,
    pub canonical_url: Option<String>,
    /// Image reference as found on the page (absolute)
    pub image_ref: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    /// Reference returned by the media store after re-hosting `image_ref`.
    /// Only this field may be surfaced to chat as an uploaded image.
    pub uploaded_image_ref: Option<String>,
}

impl Metadata {
    /// Image reference worth relocating (present and non-empty)
    pub fn relocatable_image(&self) -> Option<&str> {
        self.image_ref.as_deref().filter(|r| !r.trim().is_empty())
    }
}

/// Structured tags recognized in a document head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaTag {
    Title,
    OgDescription,
    Description,
    Type,
    Url,
    Image,
    VideoWidth,
    VideoHeight,
}

impl MetaTag {
    pub const ALL: [MetaTag; 8] = [
        MetaTag::Title,
        MetaTag::OgDescription,
        MetaTag::Description,
        MetaTag::Type,
        MetaTag::Url,
        MetaTag::Image,
        MetaTag::VideoWidth,
        MetaTag::VideoHeight,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MetaTag::Title => "og:title",
            MetaTag::OgDescription => "og:description",
            MetaTag::Description => "description",
            MetaTag::Type => "og:type",
            MetaTag::Url => "og:url",
            MetaTag::Image => "og:image",
            MetaTag::VideoWidth => "og:video:width",
            MetaTag::VideoHeight => "og:video:height",
        }
    }

    /// Match a `property`/`name` attribute value; unknown keys yield `None`
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.key().eq_ignore_ascii_case(key))
    }
}

/// A stored cache slot. Replaced wholesale on refresh, never patched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<Metadata>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Fetched from the network during this lookup
    Fresh,
    /// Served from the cache
    Cached,
    Failed,
}

/// Outcome of one lookup. Lives only as long as the lookup's caller needs it.
#[derive(Debug)]
pub struct FetchResult {
    pub status: FetchStatus,
    pub metadata: Option<Arc<Metadata>>,
    pub error: Option<FetchError>,
}

impl FetchResult {
    pub fn fresh(metadata: Arc<Metadata>) -> Self {
        Self {
            status: FetchStatus::Fresh,
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn cached(metadata: Arc<Metadata>) -> Self {
        Self {
            status: FetchStatus::Cached,
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn failed(error: FetchError) -> Self {
        Self {
            status: FetchStatus::Failed,
            metadata: None,
            error: Some(error),
        }
    }
}
