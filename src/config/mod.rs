mod settings;

pub use settings::{
    BROWSER_USER_AGENT, DEFAULT_AGENT_HOSTS, FetchGuardMode, MediaConfig, PreviewConfig, Settings,
    load_settings, settings_from,
};
