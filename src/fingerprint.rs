//! Request fingerprinting.
//!
//! Derives the cache key from a normalized view of request state. The serving
//! layer and the storage path must compute identical keys for the same logical
//! request, so everything here is deterministic: methods are uppercased, hosts
//! lowercased with default ports stripped, query pairs sorted, and cookies
//! reduced to the configured vary subset before hashing.

use std::fmt;

use axum::body::Body;
use axum::http::Request;
use sha2::{Digest, Sha256};

/// Hex length of the short URL hash used as a coarse invalidation tag.
const URL_HASH_LEN: usize = 16;

/// Opaque, deterministic identifier for a logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized, caching-relevant view of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    /// Query pairs, sorted by name then value.
    pub query: Vec<(String, String)>,
    /// Cookie subset from the configured vary list, sorted by name.
    pub cookies: Vec<(String, String)>,
}

impl RequestState {
    /// Build a normalized state from raw request parts.
    ///
    /// `vary_cookies` names the only cookies allowed to influence the
    /// fingerprint; everything else is discarded here so unrelated cookies
    /// can never perturb the key.
    pub fn from_parts(
        method: &str,
        scheme: &str,
        host: &str,
        path: &str,
        query: Option<&str>,
        cookie_header: Option<&str>,
        vary_cookies: &[String],
    ) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        let host = normalize_host(host, &scheme);

        let mut query_pairs = parse_pairs(query.unwrap_or(""), '&');
        query_pairs.sort();

        let mut cookies: Vec<(String, String)> = parse_pairs(cookie_header.unwrap_or(""), ';')
            .into_iter()
            .filter(|(name, _)| vary_cookies.iter().any(|vary| vary == name))
            .collect();
        cookies.sort();

        Self {
            method: method.to_ascii_uppercase(),
            scheme,
            host,
            path: if path.is_empty() { "/" } else { path }.to_string(),
            query: query_pairs,
            cookies,
        }
    }

    /// Build a normalized state from an axum request.
    ///
    /// The scheme falls back to `http` and the host to the `Host` header when
    /// the URI is in origin form.
    pub fn from_request(request: &Request<Body>, vary_cookies: &[String]) -> Self {
        let uri = request.uri();
        let host = uri
            .host()
            .map(str::to_string)
            .or_else(|| {
                request
                    .headers()
                    .get(axum::http::header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let cookie_header = request
            .headers()
            .get(axum::http::header::COOKIE)
            .and_then(|value| value.to_str().ok());

        Self::from_parts(
            request.method().as_str(),
            uri.scheme_str().unwrap_or("http"),
            &host,
            uri.path(),
            uri.query(),
            cookie_header,
            vary_cookies,
        )
    }

    fn url_digest(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(self.scheme.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.host.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.path.as_bytes());
        for (name, value) in &self.query {
            hasher.update(b"\nq:");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hasher
    }
}

/// Derive the full cache key from normalized request state.
pub fn generate(state: &RequestState) -> CacheKey {
    let mut hasher = state.url_digest();
    hasher.update(b"\nm:");
    hasher.update(state.method.as_bytes());
    for (name, value) in &state.cookies {
        hasher.update(b"\nc:");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    CacheKey(hex::encode(hasher.finalize()))
}

/// Derive the short URL hash, independent of method and cookie variance.
///
/// All fingerprint variants of one URL share this value, which is what makes
/// it useful as a coarse `url:<hash>` invalidation flag.
pub fn url_hash(state: &RequestState) -> String {
    let digest = hex::encode(state.url_digest().finalize());
    digest[..URL_HASH_LEN].to_string()
}

fn normalize_host(host: &str, scheme: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    let default_port = match scheme {
        "https" => ":443",
        _ => ":80",
    };
    host.strip_suffix(default_port).unwrap_or(&host).to_string()
}

fn parse_pairs(raw: &str, separator: char) -> Vec<(String, String)> {
    raw.split(separator)
        .filter_map(|piece| {
            let piece = piece.trim();
            if piece.is_empty() {
                return None;
            }
            match piece.split_once('=') {
                Some((name, value)) => Some((name.trim().to_string(), value.to_string())),
                None => Some((piece.to_string(), String::new())),
            }
        })
        .collect()
}
