use chrono::{DateTime, Utc};
use reqwest::Client;
use std::fmt;

use super::grant;
use super::types::TokenSet;
use crate::error::{require_arg, ApiError};

/// OAuth2 authorization-code token manager
///
/// Holds only the fixed client identity. Token sets are returned to the
/// caller, who decides where to keep them and when to refresh.
#[derive(Clone)]
pub struct TokenManager {
    /// HTTP client for token endpoint requests
    client: Client,

    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_endpoint: String,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

fn require(name: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ApiError::ConfigError(format!("{} must not be empty", name)));
    }
    Ok(())
}


impl TokenManager {
    /// Create a new TokenManager; every identity parameter is mandatory
    pub fn new(
        client: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let manager = Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            token_endpoint: token_endpoint.into(),
        };

        require("client_id", &manager.client_id)?;
        require("client_secret", &manager.client_secret)?;
        require("redirect_uri", &manager.redirect_uri)?;
        require("token_endpoint", &manager.token_endpoint)?;

        Ok(manager)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the URL the user agent is redirected to for consent
    pub fn build_authorization_url(
        &self,
        auth_endpoint: &str,
        scopes: &str,
        state: &str,
    ) -> Result<String, ApiError> {
        require_arg("Auth endpoint", auth_endpoint)?;
        require_arg("State", state)?;

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&access_type=offline&response_type=code",
            auth_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(scopes),
            urlencoding::encode(state),
        ))
    }

    /// Exchange an authorization code for a token set
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenSet, ApiError> {
        require_arg("Authorization code", code)?;

        tracing::info!("Exchanging authorization code for token...");
        let issued_at = Utc::now();
        let body = grant::authorization_code_body(
            code,
            &self.redirect_uri,
            &self.client_id,
            &self.client_secret,
        );

        grant::request_token(
            &self.client,
            &self.token_endpoint,
            "authorization_code",
            body,
            issued_at,
        )
        .await
    }

    /// Trade a refresh token for a new token set
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, ApiError> {
        require_arg("Refresh token", refresh_token)?;

        tracing::info!("Refreshing access token...");
        let issued_at = Utc::now();
        let body =
            grant::refresh_token_body(refresh_token, &self.client_id, &self.client_secret);

        grant::request_token(
            &self.client,
            &self.token_endpoint,
            "refresh_token",
            body,
            issued_at,
        )
        .await
    }

    /// Compare the callback state with the one issued for this flow
    pub fn validate_state(&self, provided_state: &str, expected_state: &str) -> bool {
        validate_state(provided_state, expected_state)
    }

    /// Check if token is expired (a token expiring exactly now counts)
    pub fn is_token_expired(&self, expires_at: DateTime<Utc>) -> bool {
        Utc::now() >= expires_at
    }
}

pub(super) fn validate_state(provided_state: &str, expected_state: &str) -> bool {
    if provided_state.is_empty() || expected_state.is_empty() {
        return false;
    }
    provided_state == expected_state
}
