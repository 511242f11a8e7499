//! Cross-origin policy for the gateway.
//!
//! Origins on the allow-list are echoed back verbatim so browsers may send
//! credentials; everything else receives a wildcard. `Vary: Origin` is set
//! on every response so caches never conflate responses for different
//! origins.

use axum::http::{HeaderMap, HeaderValue, header};
use std::collections::HashSet;

/// Origins allowed to make credentialed cross-origin requests.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://stitchwork.org",
    "https://www.stitchwork.org",
    "https://staging.stitchwork.org",
    "http://localhost:8787",
];

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed: HashSet<String>,
}

impl CorsPolicy {
    pub fn new<I>(origins: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            allowed: origins.into_iter().collect(),
        }
    }

    /// Policy covering the known production/staging/local origins.
    pub fn default_origins() -> Self {
        Self::new(DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()))
    }

    /// Resolve the allow-origin header value for a request origin.
    pub fn resolve<'a>(&'a self, origin: Option<&'a str>) -> &'a str {
        match origin {
            Some(origin) if self.allowed.contains(origin) => origin,
            _ => "*",
        }
    }

    /// Tag a response with the cross-origin headers for `origin`.
    /// Applied uniformly to success, failure, and preflight responses.
    pub fn apply(&self, headers: &mut HeaderMap, origin: Option<&str>) {
        let allow_origin = HeaderValue::from_str(self.resolve(origin))
            .unwrap_or(HeaderValue::from_static("*"));
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}
