use std::collections::HashSet;

use http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HOST},
};

/// Headers that only describe a single transport hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// =======================================================
/// REQUEST HEADER REWRITE (client -> upstream)
/// =======================================================
///
/// - hop-by-hop headers and the ones named in `Connection` are dropped
/// - `Host` is replaced by the upstream authority
/// - `Accept-Encoding` is dropped so the upstream answers with an identity body
/// - `Content-Length` is left to the client, which sets it from the body
/// - the client IP is appended to `X-Forwarded-For`
pub(super) fn rewrite_request_headers(
    incoming: &HeaderMap,
    upstream_authority: &str,
    client_ip: &str,
) -> HeaderMap {
    let tokens = connection_tokens(incoming);
    let mut out = HeaderMap::with_capacity(incoming.len() + 2);
    let mut forwarded_for: Vec<String> = Vec::new();

    for (name, value) in incoming {
        let lower = name.as_str();
        if is_hop_by_hop(lower) || tokens.contains(lower) {
            continue;
        }
        if *name == HOST || *name == ACCEPT_ENCODING || *name == CONTENT_LENGTH {
            continue;
        }
        if lower == X_FORWARDED_FOR {
            if let Ok(v) = value.to_str() {
                forwarded_for.push(v.trim().to_string());
            }
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    forwarded_for.push(client_ip.to_string());
    if let Ok(v) = HeaderValue::from_str(&forwarded_for.join(", ")) {
        out.insert(HeaderName::from_static(X_FORWARDED_FOR), v);
    }
    if let Ok(v) = HeaderValue::from_str(upstream_authority) {
        out.insert(HOST, v);
    }

    out
}

/// Removes hop-by-hop headers from an upstream response before it is relayed
/// or captured.
pub(super) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let tokens = connection_tokens(headers);
    for name in HOP_BY_HOP.iter().copied().chain(tokens.iter().map(String::as_str)) {
        headers.remove(name);
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

fn connection_tokens(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| {
            let trimmed = token.trim().trim_matches(|c| c == '"' || c == '\'');
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_ascii_lowercase())
            }
        })
        .collect()
}
