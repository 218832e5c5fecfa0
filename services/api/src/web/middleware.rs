//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.
//!
//! Authentication happens upstream; by the time a request reaches us the
//! gateway has put the caller's id in the `x-user-id` header.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that extracts the caller's user_id from the `x-user-id` header.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = user_id_from_headers(req.headers()).ok_or_else(|| {
        warn!(path = %req.uri().path(), "request without a valid {} header", USER_ID_HEADER);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

fn user_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}
