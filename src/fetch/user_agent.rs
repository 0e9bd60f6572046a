/// Decides which user agent a request should carry.
///
/// Most sites answer browsers better than bots, so a browser-like string is
/// sent by default. Hosts on the allow-list (and their subdomains) keep the
/// client's own signature.
#[derive(Debug, Clone)]
pub struct UserAgentPolicy {
    browser_agent: String,
    default_agent_hosts: Vec<String>,
}

impl UserAgentPolicy {
    pub fn new(browser_agent: impl Into<String>, default_agent_hosts: Vec<String>) -> Self {
        Self {
            browser_agent: browser_agent.into(),
            default_agent_hosts: default_agent_hosts
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// User agent override for `host`, or `None` to keep the client default
    pub fn agent_for(&self, host: &str) -> Option<&str> {
        let host = host.to_ascii_lowercase();
        let keep_default = self.default_agent_hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        });

        if keep_default {
            None
        } else {
            Some(&self.browser_agent)
        }
    }
}
