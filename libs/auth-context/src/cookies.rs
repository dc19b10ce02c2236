//! Minimal `Cookie` request-header handling.
//!
//! Only the request direction is needed here: the gateway reads cookies sent by the
//! client and rewrites the `Cookie` header it forwards to the backend.

use http::HeaderMap;
use http::header::COOKIE;

/// Iterate over `name=value` pairs from every `Cookie` header in `headers`.
pub fn iter_cookies(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                None
            } else {
                Some((name, value.trim()))
            }
        })
}

/// First cookie named `name`, if any.
#[must_use]
pub fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    iter_cookies(headers).find_map(|(n, v)| (n == name).then_some(v))
}

/// Join cookie pairs back into a single header value.
#[must_use]
pub fn render(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}
