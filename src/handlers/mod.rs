pub mod account;
pub mod admin;
pub mod bookings;
pub mod health;
pub mod payments;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Admin requests carry a bearer token checked against configuration.
pub(crate) fn is_admin(headers: &HeaderMap, expected_token: &str) -> bool {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    auth.strip_prefix("Bearer ")
        .map(|token| token == expected_token)
        .unwrap_or(false)
}

pub(crate) fn require_admin(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    if is_admin(headers, expected_token) {
        Ok(())
    } else {
        Err(AppError::Unauthenticated)
    }
}

/// The upstream authenticator forwards the customer identity as a header;
/// the core treats it as an opaque email-equivalent key.
pub(crate) fn customer_email(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-customer-email")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(AppError::Unauthenticated)
}
