//! Administrator bearer-token authentication (spec.md §6, SPEC_FULL.md
//! §4.13). A single bootstrap credential, compared in constant time so the
//! admin surface doesn't leak timing information about how much of the
//! token matched.

use crate::api::error::ApiError;
use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use std::sync::Arc;

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Byte-for-byte comparison that always walks the full length of both
/// hashes, regardless of where they first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Axum middleware that rejects any request whose `Authorization: Bearer
/// <token>` header does not hash to the configured
/// `ADMIN_BOOTSTRAP_PASSWORD_HASH`.
pub async fn require_admin_token(
    expected_hash: Arc<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let presented_hash = hash_token(presented);
    if !constant_time_eq(presented_hash.as_bytes(), expected_hash.as_bytes()) {
        return Err(ApiError::Unauthorized("invalid bearer token".to_string()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_hashes_compare_equal() {
        let hash = hash_token("secret");
        assert!(constant_time_eq(hash.as_bytes(), hash.as_bytes()));
    }

    #[test]
    fn different_hashes_compare_unequal() {
        let a = hash_token("secret");
        let b = hash_token("other");
        assert!(!constant_time_eq(a.as_bytes(), b.as_bytes()));
    }

    #[test]
    fn different_lengths_never_match() {
        assert!(!constant_time_eq(b"short", b"longer-value"));
    }
}
