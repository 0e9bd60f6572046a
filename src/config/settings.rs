use crate::error::{LinkPreviewError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Browser-like user agent sent to hosts outside the default-agent allow-list
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3112.113 Safari/537.36";

/// Hosts whose scraping rules are sensitive to the request signature
pub const DEFAULT_AGENT_HOSTS: &[&str] = &["spotify.com", "youtube.com", "youtu.be"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub preview: PreviewConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchGuardMode {
    /// One lock for the whole cache: misses for unrelated URLs serialize
    Global,
    /// One lock per URL: concurrent misses for the same URL share one fetch
    PerUrl,
}

impl FromStr for FetchGuardMode {
    type Err = LinkPreviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per-url" | "per_url" | "perurl" => Ok(Self::PerUrl),
            other => Err(LinkPreviewError::Config(format!(
                "Invalid PREVIEW_FETCH_GUARD: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub default_agent_hosts: Vec<String>,
    pub fetch_guard: FetchGuardMode,
    pub error_notices: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(600),
            fetch_timeout: Duration::from_secs(3),
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: BROWSER_USER_AGENT.to_string(),
            default_agent_hosts: DEFAULT_AGENT_HOSTS.iter().map(|h| h.to_string()).collect(),
            fetch_guard: FetchGuardMode::PerUrl,
            error_notices: false,
        }
    }
}

/// Media repository the relocated images are uploaded to.
/// Both fields must be set for uploads to be enabled.
#[derive(Debug, Clone, Default)]
pub struct MediaConfig {
    pub homeserver_url: Option<String>,
    pub access_token: Option<String>,
}

impl MediaConfig {
    pub fn is_enabled(&self) -> bool {
        self.homeserver_url.is_some() && self.access_token.is_some()
    }
}

pub fn load_settings() -> Result<Settings> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    settings_from(|key| std::env::var(key).ok())
}

/// Build settings from an arbitrary key lookup (the environment in production)
pub fn settings_from<F>(lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = PreviewConfig::default();

    let preview = PreviewConfig {
        cache_ttl: Duration::from_secs(parse_or(
            &lookup,
            "PREVIEW_CACHE_TTL_SECS",
            defaults.cache_ttl.as_secs(),
        )?),
        sweep_interval: Duration::from_secs(parse_or(
            &lookup,
            "PREVIEW_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        )?),
        fetch_timeout: Duration::from_secs(parse_or(
            &lookup,
            "PREVIEW_FETCH_TIMEOUT_SECS",
            defaults.fetch_timeout.as_secs(),
        )?),
        max_body_bytes: parse_or(&lookup, "PREVIEW_MAX_BODY_BYTES", defaults.max_body_bytes)?,
        user_agent: lookup("PREVIEW_USER_AGENT").unwrap_or(defaults.user_agent),
        default_agent_hosts: lookup("PREVIEW_DEFAULT_AGENT_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.default_agent_hosts),
        fetch_guard: match lookup("PREVIEW_FETCH_GUARD") {
            Some(mode) => mode.parse()?,
            None => defaults.fetch_guard,
        },
        error_notices: parse_or(&lookup, "PREVIEW_ERROR_NOTICES", defaults.error_notices)?,
    };

    if preview.fetch_timeout.is_zero() {
        return Err(LinkPreviewError::Config(
            "PREVIEW_FETCH_TIMEOUT_SECS must be positive".to_string(),
        ));
    }
    if preview.sweep_interval.is_zero() {
        return Err(LinkPreviewError::Config(
            "PREVIEW_SWEEP_INTERVAL_SECS must be positive".to_string(),
        ));
    }

    let media = MediaConfig {
        homeserver_url: lookup("MEDIA_HOMESERVER_URL").filter(|v| !v.is_empty()),
        access_token: lookup("MEDIA_ACCESS_TOKEN").filter(|v| !v.is_empty()),
    };

    Ok(Settings { preview, media })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LinkPreviewError::Config(format!("Invalid {key}"))),
        None => Ok(default),
    }
}
