//! Header handling between the client, the sidecar and the upstream service.

use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use uuid::Uuid;

/// Header name for request ID.
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest inbound request id that is reused as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Hop-by-hop headers (RFC 9110 section 7.6.1) that never cross the proxy.
pub static HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header is hop-by-hop.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Copies `headers` without hop-by-hop headers, including any named in
/// the `Connection` header. Repeated headers keep all their values.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if is_hop_by_hop(name_str) || listed.iter().any(|l| l == name_str) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Headers sent upstream: hop-by-hop headers removed, `Host` and
/// `Content-Length` left to the HTTP client, request id attached.
pub fn upstream_headers(headers: &HeaderMap, request_id: &str) -> HeaderMap {
    let mut filtered = strip_hop_by_hop(headers);
    filtered.remove(HOST);
    filtered.remove(CONTENT_LENGTH);
    set_request_id(&mut filtered, request_id);
    filtered
}

/// Headers returned to the client.
pub fn downstream_headers(headers: &HeaderMap, request_id: &str) -> HeaderMap {
    let mut filtered = strip_hop_by_hop(headers);
    set_request_id(&mut filtered, request_id);
    filtered
}

/// Sets `x-request-id`, replacing any existing value.
pub fn set_request_id(headers: &mut HeaderMap, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HEADER_REQUEST_ID.clone(), value);
    }
}

/// Request id for an inbound request.
///
/// A client-supplied `x-request-id` is kept when it is short printable
/// ASCII; otherwise a fresh UUIDv7 is generated.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::now_v7().to_string(), ToString::to_string)
}
