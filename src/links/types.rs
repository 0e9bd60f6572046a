use serde::{Deserialize, Serialize};
use std::fmt;

/// An absolute http(s) URL exactly as it appeared in the message.
///
/// The text is kept verbatim (not normalized) because it doubles as the
/// cache key: identical mentions share a slot, cosmetic variants do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UrlRef(String);

impl UrlRef {
    /// Validate `raw` as an absolute http or https URL
    pub fn parse(raw: &str) -> Option<Self> {
        let url = url::Url::parse(raw).ok()?;
        match url.scheme() {
            "http" | "https" if url.host().is_some() => Some(Self(raw.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UrlRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UrlRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
