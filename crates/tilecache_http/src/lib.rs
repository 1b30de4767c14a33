use bytes::Bytes;
use http_body_util::Full;

pub mod responses;

/// Body type of every response the proxy produces. All bodies are fully
/// buffered before they are sent.
pub type ProxyBody = Full<Bytes>;
