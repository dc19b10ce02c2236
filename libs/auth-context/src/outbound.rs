use http::header::{COOKIE, HeaderName};
use http::{HeaderMap, HeaderValue};

use crate::cookies;

/// Header state of a request about to be forwarded to a backend instance.
///
/// Authentication commands mutate this in place. Body and URI are owned by the
/// proxy layer and never touched here.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    headers: HeaderMap,
}

impl OutboundRequest {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace every value of `name` with `value`.
    ///
    /// Returns `false` when the name or value is not a valid header.
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                true
            }
            _ => false,
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        cookies::find_cookie(&self.headers, name)
    }

    /// Set a cookie, replacing any existing cookies with the same name.
    ///
    /// Returns `false`, leaving the cookies unchanged, when the resulting `Cookie`
    /// header would not be a valid header value.
    pub fn set_cookie(&mut self, name: &str, value: &str) -> bool {
        let mut pairs = self.cookie_pairs_except(&[name]);
        pairs.push((name.to_owned(), value.to_owned()));
        self.write_cookies(&pairs)
    }

    /// Drop all cookies whose name is in `names`. The `Cookie` header is removed when empty.
    ///
    /// Returns `false`, leaving the cookies unchanged, when the remaining cookies cannot
    /// be written back.
    pub fn remove_cookies(&mut self, names: &[&str]) -> bool {
        let pairs = self.cookie_pairs_except(names);
        self.write_cookies(&pairs)
    }

    fn cookie_pairs_except(&self, names: &[&str]) -> Vec<(String, String)> {
        cookies::iter_cookies(&self.headers)
            .filter(|(n, _)| !names.contains(n))
            .map(|(n, v)| (n.to_owned(), v.to_owned()))
            .collect()
    }

    fn write_cookies(&mut self, pairs: &[(String, String)]) -> bool {
        if pairs.is_empty() {
            self.headers.remove(COOKIE);
            return true;
        }
        let Ok(value) = HeaderValue::from_str(&cookies::render(pairs)) else {
            return false;
        };
        self.headers.remove(COOKIE);
        self.headers.insert(COOKIE, value);
        true
    }
}

impl From<HeaderMap> for OutboundRequest {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}
