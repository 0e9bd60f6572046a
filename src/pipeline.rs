//! Turns incoming chat text into link-preview messages

use crate::config::Settings;
use crate::error::Result;
use crate::expansion::{Expansion, NoticePolicy, image_preview, text_notice};
use crate::fetch::HttpFetcher;
use crate::links::{UrlRef, detect_urls};
use crate::logging::log_fetch_error;
use crate::media::{DisabledMediaStore, HttpMediaStore, MediaStore};
use crate::metadata::{FetchCache, FetchStatus};
use std::sync::Arc;

pub struct LinkPreviewer {
    cache: FetchCache,
    policy: NoticePolicy,
}

impl LinkPreviewer {
    pub fn new(cache: FetchCache, policy: NoticePolicy) -> Self {
        Self { cache, policy }
    }

    /// Wire the HTTP fetcher, the media store and the cache from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&settings.preview)?);

        let media: Arc<dyn MediaStore> = if settings.media.is_enabled() {
            tracing::info!("Image relocation enabled");
            Arc::new(HttpMediaStore::new(&settings.media, &settings.preview)?)
        } else {
            tracing::warn!("No media store configured, image previews are disabled");
            Arc::new(DisabledMediaStore)
        };

        let cache = FetchCache::new(fetcher, media, &settings.preview);
        let policy = NoticePolicy {
            error_notices: settings.preview.error_notices,
        };

        Ok(Self::new(cache, policy))
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Expansions for every URL in `text`, in detection order.
    ///
    /// Each detection is looked up independently (concurrently, through the
    /// shared cache) and yields its image preview, then its notice, for
    /// whichever of the two fired. A failing URL never affects the others.
    pub async fn process(&self, text: &str) -> Vec<(UrlRef, Expansion)> {
        let urls: Vec<UrlRef> = detect_urls(text).collect();
        if urls.is_empty() {
            return Vec::new();
        }

        tracing::debug!(url_count = urls.len(), "Detected URLs in message");

        let results =
            futures::future::join_all(urls.iter().map(|url| self.cache.resolve(url.as_str())))
                .await;

        let mut expansions = Vec::new();
        for (url, result) in urls.into_iter().zip(results) {
            match (&result.status, &result.error) {
                (FetchStatus::Failed, Some(error)) => {
                    log_fetch_error("expand", url.as_str(), error);
                }
                (status, _) => {
                    tracing::debug!(url = %url, status = ?status, "Resolved link metadata");
                }
            }

            let image = result
                .metadata
                .as_deref()
                .map(image_preview)
                .unwrap_or(Expansion::None);
            let notice = text_notice(&result, &self.policy);

            for expansion in [image, notice] {
                if !expansion.is_none() {
                    expansions.push((url.clone(), expansion));
                }
            }
        }

        expansions
    }
}
