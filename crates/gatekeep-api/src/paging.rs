//! Opaque paging tokens for Read.
//!
//! A token encodes the offset of the next page. Consumers treat it as
//! opaque; a token that fails to decode is a validation error.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::ApiError;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 1_000;

pub fn encode_token(offset: usize) -> String {
    BASE64.encode(offset.to_string())
}

pub fn decode_token(token: &str) -> Result<usize, ApiError> {
    let bytes = BASE64
        .decode(token)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid page token: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid page token: {}", e)))?;
    text.parse()
        .map_err(|e| ApiError::InvalidRequest(format!("invalid page token: {}", e)))
}

/// Clamp the requested page size into the allowed range.
pub fn effective_page_size(requested: Option<u32>) -> usize {
    match requested {
        Some(0) | None => DEFAULT_PAGE_SIZE,
        Some(n) => (n as usize).min(MAX_PAGE_SIZE),
    }
}
