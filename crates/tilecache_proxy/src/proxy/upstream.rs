use url::{Url, form_urlencoded};

use crate::ProxyError;

/// The single fixed upstream every non-local request is forwarded to.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    base: Url,
    authority: String,
}

impl UpstreamTarget {
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: String| ProxyError::InvalidUpstream {
            url: raw.to_string(),
            reason,
        };

        let base = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        let Some(host) = base.host_str() else {
            return Err(invalid("missing host".into()));
        };
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self { base, authority })
    }

    /// `host[:port]` of the upstream, used as the outbound `Host` header.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Builds the outbound URL for one request.
    ///
    /// The request path is joined onto the base path with exactly one slash
    /// between them, the base query (if any) is kept in front of the request
    /// query, and the credential parameter replaces any parameter of the same
    /// name. Other parameters are carried over byte for byte.
    pub fn request_url(
        &self,
        path: &str,
        query: Option<&str>,
        credential: Option<(&str, &str)>,
    ) -> Url {
        let mut url = self.base.clone();
        url.set_path(&join_path(self.base.path(), path));

        let mut query = merge_query(self.base.query(), query);
        if let Some((param, value)) = credential {
            query = set_param(&query, param, value);
        }
        url.set_query(if query.is_empty() { None } else { Some(query.as_str()) });
        url
    }
}

fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn merge_query(base: Option<&str>, request: Option<&str>) -> String {
    match (base.filter(|q| !q.is_empty()), request.filter(|q| !q.is_empty())) {
        (Some(b), Some(r)) => format!("{b}&{r}"),
        (Some(b), None) => b.to_string(),
        (None, Some(r)) => r.to_string(),
        (None, None) => String::new(),
    }
}

fn set_param(query: &str, param: &str, value: &str) -> String {
    let injected = form_urlencoded::Serializer::new(String::new())
        .append_pair(param, value)
        .finish();
    let mut pairs: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            form_urlencoded::parse(pair.as_bytes())
                .next()
                .is_none_or(|(name, _)| name != param)
        })
        .collect();
    pairs.push(&injected);
    pairs.join("&")
}
