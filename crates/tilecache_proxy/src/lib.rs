//! Upstream side of the tile cache: API key rotation, outbound request
//! rewrite, forwarding, and capture of cacheable responses.

mod error;
mod proxy;
mod rotation;

pub use error::ProxyError;
pub use proxy::{CapturedResponse, Proxy, ResponseCapture, UpstreamTarget};
pub use rotation::{CredentialRotator, RotationCounter};
