use super::MediaStore;
use crate::config::{MediaConfig, PreviewConfig};
use crate::error::{FetchError, LinkPreviewError, Result};
use crate::fetch::{UserAgentPolicy, build_client, read_capped};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;

const UPLOAD_PATH: &str = "/_matrix/media/v3/upload";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    content_uri: String,
}

/// Uploads remote images to a Matrix-style media repository.
///
/// The image is downloaded here (same timeout and size cap as page fetches)
/// and posted to the repository, which answers with a `content_uri`.
pub struct HttpMediaStore {
    client: reqwest::Client,
    upload_url: String,
    access_token: String,
    user_agent: UserAgentPolicy,
    max_body_bytes: usize,
}

impl HttpMediaStore {
    pub fn new(media: &MediaConfig, preview: &PreviewConfig) -> Result<Self> {
        let (Some(homeserver), Some(token)) = (&media.homeserver_url, &media.access_token) else {
            return Err(LinkPreviewError::Config(
                "MEDIA_HOMESERVER_URL and MEDIA_ACCESS_TOKEN must both be set".to_string(),
            ));
        };

        Ok(Self {
            client: build_client(preview.fetch_timeout)?,
            upload_url: format!("{}{}", homeserver.trim_end_matches('/'), UPLOAD_PATH),
            access_token: token.clone(),
            user_agent: UserAgentPolicy::new(
                preview.user_agent.clone(),
                preview.default_agent_hosts.clone(),
            ),
            max_body_bytes: preview.max_body_bytes,
        })
    }

    async fn download(&self, remote_url: &str) -> std::result::Result<(Vec<u8>, String), FetchError> {
        let parsed = url::Url::parse(remote_url)
            .map_err(|e| FetchError::Upload(format!("invalid image URL {remote_url}: {e}")))?;

        let mut request = self.client.get(parsed.clone());
        if let Some(agent) = parsed
            .host_str()
            .and_then(|host| self.user_agent.agent_for(host))
        {
            request = request.header(USER_AGENT, agent);
        }

        let response = request.send().await.map_err(upload_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Upload(format!(
                "image download returned status {}",
                response.status().as_u16()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = read_capped(response, self.max_body_bytes)
            .await
            .map_err(|e| FetchError::Upload(e.to_string()))?;

        Ok((body, content_type))
    }
}

fn upload_error(err: reqwest::Error) -> FetchError {
    FetchError::Upload(err.to_string())
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn upload(&self, remote_url: &str) -> std::result::Result<String, FetchError> {
        let (body, content_type) = self.download(remote_url).await?;
        let size = body.len();

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(upload_error)?;

        if !response.status().is_success() {
            return Err(FetchError::Upload(format!(
                "media repository returned status {}",
                response.status().as_u16()
            )));
        }

        let uploaded: UploadResponse = response.json().await.map_err(upload_error)?;

        tracing::info!(
            image = %remote_url,
            content_uri = %uploaded.content_uri,
            size = size,
            "Uploaded image to media repository"
        );

        Ok(uploaded.content_uri)
    }
}
