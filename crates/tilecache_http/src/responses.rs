use bytes::Bytes;
use http::{
    HeaderValue, Response, StatusCode,
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        CONTENT_LENGTH, CONTENT_TYPE, SERVER,
    },
};
use http_body_util::Full;

use crate::ProxyBody;

const SERVER_NAME: &str = concat!("tilecache/", env!("CARGO_PKG_VERSION"));

/// Generic helper for a locally generated response with a binary body.
pub fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<ProxyBody> {
    let body = body.into();
    let len = body.len();
    let mut res = Response::new(Full::new(body));
    *res.status_mut() = status;
    let headers = res.headers_mut();
    headers.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    res
}

/// Helper for plain-text responses.
fn text_response(status: StatusCode, body: &'static str) -> Response<ProxyBody> {
    response(
        status,
        "text/plain; charset=utf-8",
        Bytes::from_static(body.as_bytes()),
    )
}

pub fn html(body: &'static [u8]) -> Response<ProxyBody> {
    response(StatusCode::OK, "text/html", Bytes::from_static(body))
}

/// Fixed, permissive answer to a CORS preflight.
pub fn cors_preflight() -> Response<ProxyBody> {
    let mut res = Response::new(Full::new(Bytes::new()));
    let headers = res.headers_mut();
    headers.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    res
}

pub fn bad_request() -> Response<ProxyBody> {
    text_response(StatusCode::BAD_REQUEST, "400 Bad Request\n")
}

pub fn bad_gateway() -> Response<ProxyBody> {
    text_response(StatusCode::BAD_GATEWAY, "502 Bad Gateway\n")
}
