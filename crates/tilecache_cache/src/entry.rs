use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Stored form of the response headers: header name -> list of values.
///
/// Decoding is strict. Anything that is not a JSON object of string arrays
/// fails to decode, and the store reports that as a cache miss.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderRecord(BTreeMap<String, Vec<String>>);

impl HeaderRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the list stored under `name`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Snapshot of a live header map. Values keep their original order per name.
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut record = Self::new();
        for (name, value) in headers.iter() {
            record.append(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        record
    }

    /// Rebuilds a header map. Fails if any stored name or value is not legal HTTP.
    pub fn to_header_map(&self) -> Result<HeaderMap, CacheError> {
        let mut headers = HeaderMap::new();
        for (name, values) in &self.0 {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CacheError::InvalidHeader(format!("{name:?}: {e}")))?;
            for value in values {
                let value = HeaderValue::from_str(value)
                    .map_err(|e| CacheError::InvalidHeader(format!("{name}: {e}")))?;
                headers.append(name.clone(), value);
            }
        }
        Ok(headers)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn decode(raw: &[u8]) -> Result<Self, CacheError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl FromIterator<(String, Vec<String>)> for HeaderRecord {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One cached upstream response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub headers: HeaderRecord,
    pub body: Bytes,
}

impl CacheEntry {
    pub fn new(headers: HeaderRecord, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::header::{CACHE_CONTROL, CONTENT_TYPE};
    use http::{HeaderMap, HeaderValue};

    use super::HeaderRecord;

    #[test]
    fn header_map_round_trip_keeps_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        headers.append(CACHE_CONTROL, HeaderValue::from_static("public"));
        headers.append(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));

        let record = HeaderRecord::from_header_map(&headers);
        assert_eq!(
            record.get("cache-control"),
            Some(&["public".to_string(), "max-age=60".to_string()][..])
        );

        let rebuilt = record.to_header_map().expect("valid headers");
        let values: Vec<_> = rebuilt.get_all(CACHE_CONTROL).iter().collect();
        assert_eq!(values, vec!["public", "max-age=60"]);
        assert_eq!(rebuilt.get(CONTENT_TYPE).unwrap(), "image/png");
    }

    #[test]
    fn decode_rejects_shape_mismatch() {
        assert!(HeaderRecord::decode(br#"{"Content-Type":"image/png"}"#).is_err());
        assert!(HeaderRecord::decode(br#"["Content-Type"]"#).is_err());
        assert!(HeaderRecord::decode(b"null").is_err());
        assert!(HeaderRecord::decode(b"not json").is_err());
    }

    #[test]
    fn decode_accepts_go_style_canonical_names() {
        let record = HeaderRecord::decode(br#"{"Content-Type":["image/png"]}"#).expect("decode");
        assert_eq!(record.get("Content-Type"), Some(&["image/png".to_string()][..]));
        let headers = record.to_header_map().expect("valid headers");
        assert_eq!(headers.get("content-type").unwrap(), "image/png");
    }

    #[test]
    fn to_header_map_rejects_illegal_names() {
        let mut record = HeaderRecord::new();
        record.append("bad header", "x");
        assert!(record.to_header_map().is_err());
    }
}
