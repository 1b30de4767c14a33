#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid upstream url '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("failed to read upstream response body: {0}")]
    ResponseBody(#[source] reqwest::Error),
}
