use serde::Serialize;

use crate::error::CacheError;

/// Which half of a cached response a record holds.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Header,
    Body,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Header => "header",
            RecordKind::Body => "body",
        }
    }
}

/// Store key for one record of a cached response.
///
/// Encoded as the JSON array `["<kind>","<path>"]`. JSON string escaping
/// makes the encoding injective, so header and body records never collide
/// even for pathological paths containing quotes or commas.
#[derive(Hash, Eq, PartialEq, Debug, Serialize)]
pub struct CacheKey<'a>(RecordKind, &'a str);

impl<'a> CacheKey<'a> {
    pub fn new(kind: RecordKind, path: &'a str) -> Self {
        Self(kind, path)
    }

    pub fn header(path: &'a str) -> Self {
        Self::new(RecordKind::Header, path)
    }

    pub fn body(path: &'a str) -> Self {
        Self::new(RecordKind::Body, path)
    }

    pub fn kind(&self) -> RecordKind {
        self.0
    }

    pub fn path(&self) -> &str {
        self.1
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheKey, RecordKind};

    #[test]
    fn encodes_kind_and_path_as_json_array() {
        let key = CacheKey::header("/tile/1/2/3").encode().expect("encode");
        assert_eq!(key, br#"["header","/tile/1/2/3"]"#.to_vec());
    }

    #[test]
    fn header_and_body_keys_differ_for_same_path() {
        let header = CacheKey::new(RecordKind::Header, "/a").encode().expect("encode");
        let body = CacheKey::new(RecordKind::Body, "/a").encode().expect("encode");
        assert_ne!(header, body);
    }

    #[test]
    fn separator_characters_in_path_do_not_collide() {
        // A naive "kind:path" join would map both of these to `body:"x`.
        let a = CacheKey::body("\",\"x").encode().expect("encode");
        let b = CacheKey::header("x").encode().expect("encode");
        assert_ne!(a, b);

        let c = CacheKey::body("a,b").encode().expect("encode");
        let d = CacheKey::body("a\",\"b").encode().expect("encode");
        assert_ne!(c, d);
    }
}
