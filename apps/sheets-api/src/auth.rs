//! Shared-secret authentication.
//!
//! Every `/api/sheets/*` route requires the `x-sync-token` header to equal
//! the configured token. The check runs before the store is touched.

use axum::http::HeaderMap;

use crate::error::ApiError;

/// Header carrying the shared secret.
pub const SYNC_TOKEN_HEADER: &str = "x-sync-token";

/// Checks the request's token against the configured one.
pub fn require_sync_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = expected.ok_or(ApiError::MissingConfig("SHEETS_SYNC_TOKEN"))?;

    let provided = headers
        .get(SYNC_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(provided) if constant_time_eq(provided.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
