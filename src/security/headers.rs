//! Header filtering between caller and upstream.
//!
//! The outbound client recomputes framing and transparently decompresses
//! upstream bodies, so the corresponding headers must not be copied across.

use axum::http::{header, HeaderMap};

/// Drop headers that must not reach the upstream.
pub fn strip_request_headers(headers: &mut HeaderMap) {
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
}

/// Drop upstream headers that no longer describe the relayed body.
pub fn strip_response_headers(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::CONTENT_LENGTH);
}
