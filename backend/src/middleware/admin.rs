use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::api::AppState;
use crate::error::AppError;

pub const ADMIN_KEY_HEADER: &str = "admin-key";

/// Reject requests whose `admin-key` header does not match the configured key
pub async fn require_admin_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if keys_match(key.as_bytes(), state.admin_key.as_bytes()) => {
            Ok(next.run(req).await)
        }
        _ => {
            warn!("Rejected admin request to {}", req.uri().path());
            Err(AppError::Unauthorized)
        }
    }
}

/// Constant-time over the key bytes
fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
