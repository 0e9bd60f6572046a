//! Image relocation through the chat platform's media store

mod matrix;

pub use matrix::HttpMediaStore;

use crate::error::FetchError;
use async_trait::async_trait;

/// Capability supplied by the chat client: fetch a remote resource, store
/// it, and hand back a stable reference usable in outbound messages.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, remote_url: &str) -> Result<String, FetchError>;
}

/// Media store used when uploads are not configured; every upload fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMediaStore;

#[async_trait]
impl MediaStore for DisabledMediaStore {
    async fn upload(&self, _remote_url: &str) -> Result<String, FetchError> {
        Err(FetchError::Upload("media store not configured".to_string()))
    }
}

/// Re-host `image_ref` through `store`
pub async fn relocate(store: &dyn MediaStore, image_ref: &str) -> Result<String, FetchError> {
    let uploaded = store.upload(image_ref).await?;
    if uploaded.trim().is_empty() {
        return Err(FetchError::Upload(
            "media store returned an empty reference".to_string(),
        ));
    }

    tracing::debug!(image = %image_ref, uploaded = %uploaded, "Relocated image");
    Ok(uploaded)
}
