mod cache;
mod server;
mod tilecache;
mod upstream;
pub mod validation;

pub use cache::CacheConfig;
pub use server::ServerConfig;
pub use tilecache::{ConfigLoadError, TilecacheConfig};
pub use upstream::UpstreamConfig;
pub use validation::{ConfigIssue, ConfigReport, Severity};
