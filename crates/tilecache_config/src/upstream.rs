use serde::Deserialize;

// =======================================================
// UPSTREAM CONFIG + DEFAULTS
// =======================================================
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every proxied request is resolved against.
    pub url: String,
    /// Query parameter that carries the API key.
    pub key_param: String,
    /// API keys rotated round-robin across upstream requests.
    pub api_keys: Vec<String>,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for one upstream round trip.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://tile.googleapis.com/".into(),
            key_param: "key".into(),
            api_keys: Vec::new(),
            connect_timeout_secs: 10,
            timeout_secs: 15 * 60,
        }
    }
}

// Keys are secrets; only their count is printed.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("key_param", &self.key_param)
            .field("api_keys", &format_args!("<{} keys>", self.api_keys.len()))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl UpstreamConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key_param(&self) -> &str {
        &self.key_param
    }

    pub fn api_keys(&self) -> &[String] {
        &self.api_keys
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &UpstreamConfig) {
        if self.url.trim().is_empty() {
            self.url = defaults.url.clone();
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = defaults.connect_timeout_secs;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = defaults.timeout_secs;
        }
        // Blank entries would inject `key=` upstream.
        let before = self.api_keys.len();
        self.api_keys.retain(|k| !k.trim().is_empty());
        let dropped = before - self.api_keys.len();
        if dropped > 0 {
            tracing::warn!(
                target: "tilecache::config",
                dropped,
                "Ignoring blank upstream.api_keys entries"
            );
        }
    }
}
