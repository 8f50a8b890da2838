//! Anonymous cookie sessions.
//!
//! A session is nothing more than an opaque user id carried in a cookie.
//! There is no authentication; the id only partitions conversations.

use axum::http::{HeaderMap, HeaderValue, header};
use relaychat_core::message::UserId;

pub const SESSION_COOKIE: &str = "relaychat_session";

/// The user id carried by the request's session cookie, if any.
pub fn session_user(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| UserId::from(value))
}

/// The request's user, minting a new one when the cookie is absent.
///
/// The returned headers carry `Set-Cookie` for a freshly minted id and are
/// empty otherwise.
pub fn resolve_user(headers: &HeaderMap) -> (UserId, HeaderMap) {
    let mut response_headers = HeaderMap::new();
    if let Some(user) = session_user(headers) {
        return (user, response_headers);
    }

    let user = UserId::generate();
    if let Ok(cookie) = HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={user}; Path=/; HttpOnly; SameSite=Lax"
    )) {
        response_headers.insert(header::SET_COOKIE, cookie);
    }
    tracing::debug!(user = %user, "New session");
    (user, response_headers)
}
