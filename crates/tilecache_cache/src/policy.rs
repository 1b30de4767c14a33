use http::{Method, StatusCode};

pub struct CachePolicy;

impl CachePolicy {
    /// Only methods listed here are looked up in, or written to, the store.
    pub fn is_cacheable_method(method: &Method) -> bool {
        *method == Method::GET
    }

    /// A response is stored only when it is a plain 200 answer to a GET.
    pub fn is_cacheable(method: &Method, status: StatusCode) -> bool {
        Self::is_cacheable_method(method) && status == StatusCode::OK
    }
}
