// Header handling for forwarded requests.

use axum::http::header::{CONNECTION, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// X-Forwarded-Host header key.
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Hop-by-hop headers that must not be forwarded by proxies (RFC 7230, section 6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Removes hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Extracts the client-facing host, preferring X-Forwarded-Host over Host.
pub fn forwarded_host(headers: &HeaderMap) -> Option<HeaderValue> {
    // Prefer X-Forwarded-Host when present and non-empty.
    if let Some(host) = headers.get(&X_FORWARDED_HOST) {
        if !host.as_bytes().is_empty() {
            return Some(host.clone());
        }
    }
    headers
        .get(HOST)
        .filter(|host| !host.as_bytes().is_empty())
        .cloned()
}

/// Prepares request headers for the backend: strips hop-by-hop headers and
/// records the client-facing host in X-Forwarded-Host.
pub fn prepare_request_headers(headers: &mut HeaderMap) {
    let host = forwarded_host(headers);
    strip_hop_by_hop(headers);
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST, host);
    }
}
