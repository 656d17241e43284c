// Session cookie and CORS middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};

use crate::session::{SessionId, SessionStore};

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "fortnox_sid";

/// Extract the session id from the Cookie header(s)
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value announcing a new session
pub fn session_set_cookie(id: &SessionId) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, id.0
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("Failed to build session cookie: {}", e);
            None
        }
    }
}

/// Session middleware
///
/// Resolves the session cookie to an `Option<SessionId>` request extension.
/// Unknown or idle sessions resolve to `None`; nothing is created here, so
/// anonymous traffic does not grow the store. `/auth/login` starts sessions.
pub async fn session_middleware(
    State(sessions): State<SessionStore>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = session_cookie(request.headers())
        .map(SessionId)
        .filter(|id| sessions.touch(id));

    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Create CORS middleware layer
///
/// Configures CORS to allow all origins, methods, and headers.
/// Handles OPTIONS preflight requests automatically.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
