use super::{FetchedPage, Fetcher, UserAgentPolicy};
use crate::config::PreviewConfig;
use crate::error::{FetchError, LinkPreviewError, Result};
use crate::logging::Timer;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use url::Url;

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: UserAgentPolicy,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        let client = build_client(config.fetch_timeout)?;

        Ok(Self {
            client,
            user_agent: UserAgentPolicy::new(
                config.user_agent.clone(),
                config.default_agent_hosts.clone(),
            ),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| LinkPreviewError::Config(format!("Failed to build HTTP client: {e}")))
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        let _timer = Timer::new("http_fetch", url);

        let parsed = Url::parse(url)
            .map_err(|e| FetchError::ParseFailure(format!("invalid URL {url}: {e}")))?;

        let mut request = self.client.get(parsed.clone());
        if let Some(agent) = parsed
            .host_str()
            .and_then(|host| self.user_agent.agent_for(host))
        {
            request = request.header(USER_AGENT, agent);
        }

        let response = request.send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(url = %url, status = status.as_u16(), "Rejecting non-200 response");
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = read_capped(response, self.max_body_bytes).await?;

        tracing::debug!(
            url = %url,
            content_type = ?content_type,
            body_len = body.len(),
            "Fetched page"
        );

        Ok(FetchedPage { body, content_type })
    }
}

/// Read a response body, failing once it grows past `limit` bytes.
/// Bodies are never truncated.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> std::result::Result<Vec<u8>, FetchError> {
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(FetchError::TooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
