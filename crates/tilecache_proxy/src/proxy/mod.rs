mod capture;
mod headers;
mod upstream;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{Response, request::Parts};
use tilecache_cache::CacheStore;
use tilecache_config::UpstreamConfig;
use tilecache_http::{ProxyBody, responses};
use tracing::{debug, error};

pub use capture::{CapturedResponse, ResponseCapture};
pub use upstream::UpstreamTarget;

use self::headers::rewrite_request_headers;
use crate::{CredentialRotator, ProxyError, RotationCounter};

/// =======================================================
/// PROXY STATE
/// =======================================================
///
/// Everything a request needs to reach the upstream: the HTTP client (which
/// owns the upstream connection pool), the fixed target, the key rotator and
/// the capture step that feeds the cache.
///
/// Shared by every connection task behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Proxy {
    client: reqwest::Client,
    upstream: UpstreamTarget,
    key_param: String,
    rotator: CredentialRotator,
    capture: ResponseCapture,
}

impl Proxy {
    pub fn new(
        config: &UpstreamConfig,
        cache: CacheStore,
        counter: Arc<RotationCounter>,
    ) -> Result<Self, ProxyError> {
        let upstream = UpstreamTarget::parse(config.url())?;

        // Redirects go back to the client untouched.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs()))
            .timeout(Duration::from_secs(config.timeout_secs()))
            .build()
            .map_err(ProxyError::Client)?;

        Ok(Self {
            client,
            upstream,
            key_param: config.key_param().to_string(),
            rotator: CredentialRotator::new(config.api_keys().to_vec(), counter),
            capture: ResponseCapture::new(cache),
        })
    }

    pub fn upstream(&self) -> &UpstreamTarget {
        &self.upstream
    }

    /// Forwards one request upstream and relays the buffered answer.
    ///
    /// Cacheable answers are written to the store before they are returned.
    /// Transport failures become `502 Bad Gateway`.
    pub async fn serve(&self, parts: Parts, body: Bytes, client: SocketAddr) -> Response<ProxyBody> {
        let path = parts.uri.path();

        match self.forward(&parts, body, client).await {
            Ok(captured) => {
                self.capture.capture(&parts.method, path, &captured).await;
                captured.into_response()
            }
            Err(err) => {
                error!(
                    target: "tilecache::proxy",
                    method = %parts.method,
                    path,
                    client = %client,
                    error = %err,
                    "Upstream request failed"
                );
                responses::bad_gateway()
            }
        }
    }

    async fn forward(
        &self,
        parts: &Parts,
        body: Bytes,
        client: SocketAddr,
    ) -> Result<CapturedResponse, ProxyError> {
        let credential = self
            .rotator
            .next()
            .map(|key| (self.key_param.as_str(), key));
        let url = self
            .upstream
            .request_url(parts.uri.path(), parts.uri.query(), credential);
        let headers = rewrite_request_headers(
            &parts.headers,
            self.upstream.authority(),
            &client.ip().to_string(),
        );

        let mut request = self
            .client
            .request(parts.method.clone(), url)
            .headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(ProxyError::Upstream)?;
        debug!(
            target: "tilecache::proxy",
            method = %parts.method,
            path = parts.uri.path(),
            status = response.status().as_u16(),
            "Upstream responded"
        );

        ResponseCapture::materialize(&parts.method, response).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use bytes::Bytes;
    use http::{HeaderValue, Method, Request, Response, StatusCode, header};
    use http_body_util::{BodyExt, Full};
    use hyper::{body::Incoming, server::conn::http1, service::service_fn};
    use hyper_util::rt::TokioIo;
    use tilecache_cache::CacheStore;
    use tilecache_config::UpstreamConfig;
    use tokio::net::TcpListener;

    use super::Proxy;
    use crate::RotationCounter;

    /// Echoes `<method> <uri> <body>` and reports the headers it saw.
    /// `/missing` answers 404 and `/redirect` answers 302.
    async fn fake_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let counter = counter.clone();
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.unwrap().to_bytes();

                            let text = format!(
                                "{} {} {}",
                                parts.method,
                                parts.uri,
                                String::from_utf8_lossy(&body)
                            );
                            let mut res = Response::new(Full::new(Bytes::from(text)));
                            *res.status_mut() = match parts.uri.path() {
                                "/missing" => StatusCode::NOT_FOUND,
                                "/redirect" => StatusCode::FOUND,
                                _ => StatusCode::OK,
                            };

                            let seen_host = parts
                                .headers
                                .get(header::HOST)
                                .cloned()
                                .unwrap_or(HeaderValue::from_static("-"));
                            let seen_encoding = if parts.headers.contains_key(header::ACCEPT_ENCODING) {
                                "present"
                            } else {
                                "absent"
                            };
                            let h = res.headers_mut();
                            h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                            h.insert(header::LOCATION, HeaderValue::from_static("/elsewhere"));
                            h.insert("x-seen-host", seen_host);
                            h.insert("x-seen-accept-encoding", HeaderValue::from_static(seen_encoding));
                            Ok::<_, Infallible>(res)
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        (addr, hits)
    }

    fn upstream_config(addr: SocketAddr, keys: &[&str]) -> UpstreamConfig {
        UpstreamConfig {
            url: format!("http://{addr}/"),
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..UpstreamConfig::default()
        }
    }

    fn client() -> SocketAddr {
        "10.1.2.3:5555".parse().unwrap()
    }

    fn get(uri: &str) -> http::request::Parts {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::HOST, "localhost:8080")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    async fn body_of(res: Response<tilecache_http::ProxyBody>) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn forwards_with_rotated_key_and_rewritten_headers() {
        let (addr, hits) = fake_upstream().await;
        let proxy = Proxy::new(
            &upstream_config(addr, &["k1", "k2"]),
            CacheStore::in_memory(),
            Arc::new(RotationCounter::new()),
        )
        .unwrap();

        let res = proxy.serve(get("/tiles/a?x=1"), Bytes::new(), client()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-seen-host"], addr.to_string().as_str());
        assert_eq!(res.headers()["x-seen-accept-encoding"], "absent");

        let expected = "GET /tiles/a?x=1&key=k2 ";
        assert_eq!(res.headers()[header::CONTENT_LENGTH], expected.len().to_string().as_str());
        assert_eq!(body_of(res).await, expected);

        let res = proxy.serve(get("/tiles/b"), Bytes::new(), client()).await;
        assert_eq!(body_of(res).await, "GET /tiles/b?key=k1 ");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stores_only_ok_get_answers() {
        let (addr, _hits) = fake_upstream().await;
        let cache = CacheStore::in_memory();
        let proxy = Proxy::new(
            &upstream_config(addr, &[]),
            cache.clone(),
            Arc::new(RotationCounter::new()),
        )
        .unwrap();

        proxy.serve(get("/tiles/a"), Bytes::new(), client()).await;
        let entry = cache.load("/tiles/a").expect("200 GET is stored");
        assert_eq!(entry.body.as_ref(), b"GET /tiles/a ");
        assert_eq!(entry.headers.get("content-type"), Some(&["text/plain".to_string()][..]));

        let res = proxy.serve(get("/missing"), Bytes::new(), client()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(cache.load("/missing").is_none());

        let (mut parts, _) = Request::new(()).into_parts();
        parts.method = Method::POST;
        parts.uri = "/tiles/post".parse().unwrap();
        let res = proxy
            .serve(parts, Bytes::from_static(b"payload"), client())
            .await;
        assert_eq!(body_of(res).await, "POST /tiles/post payload");
        assert!(cache.load("/tiles/post").is_none());
    }

    #[tokio::test]
    async fn relays_redirects_without_following() {
        let (addr, hits) = fake_upstream().await;
        let proxy = Proxy::new(
            &upstream_config(addr, &[]),
            CacheStore::in_memory(),
            Arc::new(RotationCounter::new()),
        )
        .unwrap();

        let res = proxy.serve(get("/redirect"), Bytes::new(), client()).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "/elsewhere");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cache = CacheStore::in_memory();
        let proxy = Proxy::new(
            &upstream_config(addr, &["k1"]),
            cache.clone(),
            Arc::new(RotationCounter::new()),
        )
        .unwrap();

        let res = proxy.serve(get("/tiles/a"), Bytes::new(), client()).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert!(cache.load("/tiles/a").is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_upstream_url() {
        let config = UpstreamConfig {
            url: "ftp://tiles".into(),
            ..UpstreamConfig::default()
        };
        let err = Proxy::new(&config, CacheStore::in_memory(), Arc::new(RotationCounter::new()))
            .unwrap_err();
        assert!(err.to_string().contains("ftp://tiles"));
    }
}
