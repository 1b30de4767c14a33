use std::{fmt::Display, net::SocketAddr, sync::Arc};

use http::{HeaderValue, Method, Request, Response, StatusCode, header::CONTENT_LENGTH};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use tilecache_cache::{CachePolicy, CacheStore};
use tilecache_config::UpstreamConfig;
use tilecache_http::{ProxyBody, responses};
use tilecache_proxy::{Proxy, ProxyError, RotationCounter};
use tracing::{debug, warn};

/// Viewer page served on the index paths.
pub const INDEX_HTML: &[u8] = include_bytes!("../assets/index.html");

/// Paths answered with [`INDEX_HTML`] regardless of method or cache contents.
pub const INDEX_PATHS: [&str; 3] = ["/", "", "/index.html"];

/// Outcome of classifying one request, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// CORS preflight, answered locally.
    Preflight,
    /// Embedded viewer page.
    Index,
    /// Try the store first, fall back to upstream on a miss.
    CacheLookup,
    Upstream,
}

impl Route {
    pub fn classify(method: &Method, path: &str) -> Self {
        if *method == Method::OPTIONS {
            Route::Preflight
        } else if INDEX_PATHS.contains(&path) {
            Route::Index
        } else if CachePolicy::is_cacheable_method(method) {
            Route::CacheLookup
        } else {
            Route::Upstream
        }
    }
}

/// Per-request entry point: CORS, index page, cache hit or upstream.
#[derive(Debug)]
pub struct Dispatcher {
    cache: CacheStore,
    proxy: Proxy,
    index: &'static [u8],
}

impl Dispatcher {
    pub fn new(cache: CacheStore, proxy: Proxy, index: &'static [u8]) -> Self {
        Self {
            cache,
            proxy,
            index,
        }
    }

    /// Wires a dispatcher and its proxy to the same store. `counter` is the
    /// rotation counter shared by every upstream request of the process.
    pub fn from_config(
        upstream: &UpstreamConfig,
        cache: CacheStore,
        counter: Arc<RotationCounter>,
    ) -> Result<Self, ProxyError> {
        let proxy = Proxy::new(upstream, cache.clone(), counter)?;
        Ok(Self::new(cache, proxy, INDEX_HTML))
    }

    pub async fn handle<B>(&self, req: Request<B>, client: SocketAddr) -> Response<ProxyBody>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path();

        match Route::classify(&parts.method, path) {
            Route::Preflight => return responses::cors_preflight(),
            Route::Index => return responses::html(self.index),
            Route::CacheLookup => {
                if let Some(res) = self.cached(path).await {
                    return res;
                }
                debug!(target: "tilecache::dispatch", path, "Cache miss");
            }
            Route::Upstream => {}
        }

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(
                    target: "tilecache::dispatch",
                    client = %client,
                    error = %e,
                    "Failed to read request body"
                );
                return responses::bad_request();
            }
        };

        self.proxy.serve(parts, body, client).await
    }

    async fn cached(&self, path: &str) -> Option<Response<ProxyBody>> {
        let entry = self.cache.load_async(path.to_string()).await?;

        // A record that no longer maps to legal headers is served from upstream.
        let mut headers = match entry.headers.to_header_map() {
            Ok(headers) => headers,
            Err(e) => {
                warn!(
                    target: "tilecache::dispatch",
                    path,
                    error = %e,
                    "Stored headers are not valid HTTP; ignoring entry"
                );
                return None;
            }
        };
        headers.insert(CONTENT_LENGTH, HeaderValue::from(entry.body.len()));

        debug!(
            target: "tilecache::dispatch",
            path,
            bytes = entry.body.len(),
            "Cache hit"
        );

        let mut res = Response::new(Full::new(entry.body));
        *res.status_mut() = StatusCode::OK;
        *res.headers_mut() = headers;
        Some(res)
    }
}
