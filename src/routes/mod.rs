use axum::{
    extract::{Path, Query, RawQuery, State},
    http::header,
    middleware as axum_middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{OAuthRequestContext, TokenManager, TokenSet};
use crate::config::Config;
use crate::error::ApiError;
use crate::http_client::ApiClient;
use crate::middleware;
use crate::session::{SessionId, SessionStore};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub token_manager: Arc<TokenManager>,
    pub api_client: Arc<ApiClient>,
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

/// Query parameters of the authorization redirect
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Build the application with all routes and middleware
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(auth_routes(state.clone()))
        .merge(api_routes(state))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Health check routes (no session)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// OAuth2 flow routes
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/status", get(status_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.sessions.clone(),
            middleware::session_middleware,
        ))
        .with_state(state)
}

/// Resource API proxy routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/companyinformation", get(company_information_handler))
        .route("/api/customers", get(customers_handler))
        .route("/api/invoices", get(invoices_handler))
        .route("/api/test-connection", get(test_connection_handler))
        .route(
            "/api/proxy/*endpoint",
            get(proxy_get_handler)
                .post(proxy_post_handler)
                .put(proxy_put_handler)
                .delete(proxy_delete_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.sessions.clone(),
            middleware::session_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Fortnox Connect is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

fn token_summary(tokens: &TokenSet) -> Value {
    json!({
        "status": "authenticated",
        "token_type": tokens.token_type,
        "expires_at": tokens.expires_at.to_rfc3339(),
        "scope": tokens.scope,
    })
}

fn not_authenticated() -> ApiError {
    ApiError::AuthError("Not authenticated".to_string())
}

fn require_session(session: Option<SessionId>) -> Result<SessionId, ApiError> {
    session.ok_or_else(not_authenticated)
}

/// GET /auth/login - Start the authorization-code flow
///
/// Stores a fresh CSRF state in the session and redirects the browser to the
/// authorization endpoint. This is the only place sessions are created.
async fn login_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Result<Response, ApiError> {
    let context = OAuthRequestContext::generate();
    let url = state.token_manager.build_authorization_url(
        &state.config.auth_endpoint,
        &state.config.scopes,
        context.state(),
    )?;

    let (session, is_new) = match session {
        Some(id) => (id, false),
        None => (state.sessions.create(), true),
    };
    if !state.sessions.set_pending_state(&session, context) {
        return Err(ApiError::AuthError(
            "Session expired, please log in again".to_string(),
        ));
    }

    tracing::info!("Redirecting to authorization endpoint");
    let mut response = Redirect::to(&url).into_response();
    if is_new {
        if let Some(cookie) = middleware::session_set_cookie(&session) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

/// GET /auth/callback - Authorization redirect target
async fn callback_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    // The stored expectation is consumed whatever the outcome
    let expected = session
        .as_ref()
        .and_then(|id| state.sessions.take_pending_state(id));

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Authorization denied by provider");
        let message = match params.error_description {
            Some(description) => format!("Authorization error: {} ({})", error, description),
            None => format!("Authorization error: {}", error),
        };
        return Err(ApiError::AuthError(message));
    }

    let provided = params.state.unwrap_or_default();
    let state_ok = expected
        .map(|context| context.verify(&provided))
        .unwrap_or(false);
    let session = match session {
        Some(id) if state_ok => id,
        _ => {
            tracing::warn!("Callback with invalid or missing state parameter");
            return Err(ApiError::AuthError(
                "Invalid state parameter. Possible CSRF attack.".to_string(),
            ));
        }
    };

    let code = params.code.unwrap_or_default();
    let tokens = state.token_manager.exchange_code_for_token(&code).await?;
    let summary = token_summary(&tokens);
    if !state.sessions.set_tokens(&session, tokens) {
        return Err(ApiError::AuthError(
            "Session ended during authorization".to_string(),
        ));
    }

    tracing::info!("✅ Authorization completed");
    Ok(Json(summary))
}

/// GET /auth/status - Whether the session holds a token set
async fn status_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Json<Value> {
    match session.and_then(|id| state.sessions.tokens(&id)) {
        Some(tokens) => Json(json!({
            "authenticated": true,
            "expired": state.token_manager.is_token_expired(tokens.expires_at),
            "expires_at": tokens.expires_at.to_rfc3339(),
            "scope": tokens.scope,
        })),
        None => Json(json!({ "authenticated": false })),
    }
}

/// POST /auth/refresh - Refresh the session's token set now
async fn refresh_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Result<Json<Value>, ApiError> {
    let session = require_session(session)?;
    let lock = state
        .sessions
        .refresh_lock(&session)
        .ok_or_else(not_authenticated)?;
    let _guard = lock.lock().await;

    let current = state
        .sessions
        .tokens(&session)
        .ok_or_else(not_authenticated)?;
    let tokens = refresh_session(&state, &session, current).await?;
    Ok(Json(token_summary(&tokens)))
}

/// POST /auth/logout - Forget the session
async fn logout_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Json<Value> {
    if let Some(session) = session {
        state.sessions.clear(&session);
    }
    Json(json!({ "status": "logged_out" }))
}

/// Replace the session's token set with a refreshed one
///
/// Callers hold the session's refresh lock.
async fn refresh_session(
    state: &AppState,
    session: &SessionId,
    current: TokenSet,
) -> Result<TokenSet, ApiError> {
    let refresh_token = current
        .refresh_token
        .ok_or_else(|| ApiError::AuthError("No refresh token available".to_string()))?;

    let tokens = state
        .token_manager
        .refresh_access_token(&refresh_token)
        .await?
        .or_refresh_token(Some(refresh_token));

    // A logout during the refresh wins
    if !state.sessions.set_tokens(session, tokens.clone()) {
        return Err(ApiError::AuthError(
            "Session ended during refresh".to_string(),
        ));
    }
    Ok(tokens)
}

/// Access token for the session, refreshed first if it has expired
async fn fresh_access_token(
    state: &AppState,
    session: Option<SessionId>,
) -> Result<String, ApiError> {
    let session = require_session(session)?;
    let tokens = state
        .sessions
        .tokens(&session)
        .ok_or_else(not_authenticated)?;

    if !state.token_manager.is_token_expired(tokens.expires_at) {
        return Ok(tokens.access_token);
    }

    let lock = state
        .sessions
        .refresh_lock(&session)
        .ok_or_else(not_authenticated)?;
    let _guard = lock.lock().await;

    // Another request may have refreshed while this one waited
    let tokens = state
        .sessions
        .tokens(&session)
        .ok_or_else(not_authenticated)?;
    if !state.token_manager.is_token_expired(tokens.expires_at) {
        return Ok(tokens.access_token);
    }

    tracing::info!("Access token expired, refreshing before proxying");
    Ok(refresh_session(state, &session, tokens).await?.access_token)
}

fn json_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Proxied endpoint including the incoming query string
fn proxied_endpoint(endpoint: String, query: Option<String>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{}?{}", endpoint, query),
        _ => endpoint,
    }
}

fn optional_body(body: &str) -> Option<&str> {
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

/// GET /api/companyinformation
async fn company_information_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Result<Response, ApiError> {
    let token = fresh_access_token(&state, session).await?;
    let body = state.api_client.get_company_information(&token).await?;
    Ok(json_response(body))
}

/// GET /api/customers
async fn customers_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Result<Response, ApiError> {
    let token = fresh_access_token(&state, session).await?;
    let body = state.api_client.get_customers(&token).await?;
    Ok(json_response(body))
}

/// GET /api/invoices
async fn invoices_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Result<Response, ApiError> {
    let token = fresh_access_token(&state, session).await?;
    let body = state.api_client.get_invoices(&token).await?;
    Ok(json_response(body))
}

/// GET /api/test-connection - Probe the API with the session's token
async fn test_connection_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
) -> Result<Json<Value>, ApiError> {
    let token = fresh_access_token(&state, session).await?;
    let connected = state.api_client.test_connection(&token).await;
    Ok(Json(json!({ "connected": connected })))
}

/// GET /api/proxy/{endpoint}
async fn proxy_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let endpoint = proxied_endpoint(endpoint, query);
    tracing::info!(endpoint = %endpoint, "Proxy GET");

    let token = fresh_access_token(&state, session).await?;
    let body = state.api_client.get(&endpoint, &token).await?;
    Ok(json_response(body))
}

/// POST /api/proxy/{endpoint}
async fn proxy_post_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, ApiError> {
    let endpoint = proxied_endpoint(endpoint, query);
    tracing::info!(endpoint = %endpoint, "Proxy POST");

    let token = fresh_access_token(&state, session).await?;
    let body = state
        .api_client
        .post(&endpoint, &token, optional_body(&body))
        .await?;
    Ok(json_response(body))
}

/// PUT /api/proxy/{endpoint}
async fn proxy_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, ApiError> {
    let endpoint = proxied_endpoint(endpoint, query);
    tracing::info!(endpoint = %endpoint, "Proxy PUT");

    let token = fresh_access_token(&state, session).await?;
    let body = state
        .api_client
        .put(&endpoint, &token, optional_body(&body))
        .await?;
    Ok(json_response(body))
}

/// DELETE /api/proxy/{endpoint}
async fn proxy_delete_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Option<SessionId>>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let endpoint = proxied_endpoint(endpoint, query);
    tracing::info!(endpoint = %endpoint, "Proxy DELETE");

    let token = fresh_access_token(&state, session).await?;
    let deleted = state.api_client.delete(&endpoint, &token).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
