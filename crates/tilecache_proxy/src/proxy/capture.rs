use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, header::CONTENT_LENGTH};
use http_body_util::Full;
use tilecache_cache::{CacheEntry, CachePolicy, CacheStore, HeaderRecord};
use tilecache_http::ProxyBody;
use tracing::warn;

use super::headers::strip_hop_by_hop;
use crate::ProxyError;

/// Fully buffered upstream response.
///
/// Built once per upstream round trip and then read by both the cache write
/// and the client relay, so the two always see the same bytes.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    pub fn into_response(self) -> Response<ProxyBody> {
        let mut res = Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

/// Persists cacheable upstream responses into the [`CacheStore`].
#[derive(Debug, Clone)]
pub struct ResponseCapture {
    cache: CacheStore,
}

impl ResponseCapture {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    /// Reads the whole upstream body and normalizes the headers for relay.
    ///
    /// The upstream response is consumed here; on a read error it is dropped
    /// with the rest of the future and its connection released.
    pub async fn materialize(
        method: &Method,
        response: reqwest::Response,
    ) -> Result<CapturedResponse, ProxyError> {
        let status = response.status();
        let mut headers = response.headers().clone();
        let body = response.bytes().await.map_err(ProxyError::ResponseBody)?;

        strip_hop_by_hop(&mut headers);
        if carries_body(method, status) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }

    /// Stores `captured` under `path` when the exchange is cacheable.
    ///
    /// Returns whether the entry was written. Write failures are logged and
    /// never reach the client.
    pub async fn capture(&self, method: &Method, path: &str, captured: &CapturedResponse) -> bool {
        if !CachePolicy::is_cacheable(method, captured.status) {
            return false;
        }

        let entry = CacheEntry::new(
            HeaderRecord::from_header_map(&captured.headers),
            captured.body.clone(),
        );
        match self.cache.save_async(path.to_string(), entry).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: "tilecache::cache",
                    path,
                    error = %err,
                    "Cache write failed; response relayed uncached"
                );
                false
            }
        }
    }
}

/// Whether `Content-Length` is recomputed from the buffered body. HEAD
/// answers and bodiless statuses keep the length upstream declared.
fn carries_body(method: &Method, status: StatusCode) -> bool {
    *method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}
