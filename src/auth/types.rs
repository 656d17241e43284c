// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Raw token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token set issued by an authorization-code exchange or a refresh
///
/// Immutable once built. A refresh produces a new `TokenSet` that supersedes
/// the old one; nothing here expires or discards tokens on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Build from a provider response, anchoring expiry at `issued_at`
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let expires_at = i64::try_from(response.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
            scope: response.scope,
            expires_at,
        }
    }

    /// Keep `previous` as the refresh token when the provider sent none
    pub fn or_refresh_token(self, previous: Option<String>) -> Self {
        Self {
            refresh_token: self.refresh_token.or(previous),
            ..self
        }
    }
}

/// Anti-CSRF correlation for one authorization round trip
///
/// `verify` takes `self` by value so a stored expectation can only be checked
/// once, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRequestContext {
    state: String,
}

impl OAuthRequestContext {
    pub fn generate() -> Self {
        Self {
            state: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn verify(self, provided_state: &str) -> bool {
        super::manager::validate_state(provided_state, &self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> serde_json::Result<TokenResponse> {
        serde_json::from_str(json)
    }

    #[test]
    fn test_deserialize_full_response() {
        let response = parse(
            r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600,"refresh_token":"xyz","scope":"companyinformation invoice"}"#,
        )
        .unwrap();

        assert_eq!(response.access_token, "abc");
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.refresh_token.as_deref(), Some("xyz"));
        assert_eq!(response.scope.as_deref(), Some("companyinformation invoice"));
    }

    #[test]
    fn test_optional_fields_absent_or_null() {
        let response =
            parse(r#"{"access_token":"abc","token_type":"Bearer","expires_in":60}"#).unwrap();
        assert!(response.refresh_token.is_none());
        assert!(response.scope.is_none());

        let response = parse(
            r#"{"access_token":"abc","token_type":"Bearer","expires_in":60,"refresh_token":null,"scope":null}"#,
        )
        .unwrap();
        assert!(response.refresh_token.is_none());
        assert!(response.scope.is_none());
    }

    #[test]
    fn test_required_fields_enforced() {
        assert!(parse(r#"{"token_type":"Bearer","expires_in":60}"#).is_err());
        assert!(parse(r#"{"access_token":"abc","expires_in":60}"#).is_err());
        assert!(parse(r#"{"access_token":"abc","token_type":"Bearer"}"#).is_err());
        assert!(parse(r#"{"access_token":"abc","token_type":"Bearer","expires_in":-5}"#).is_err());
        assert!(parse(r#"{"access_token":"abc","token_type":"Bearer","expires_in":"soon"}"#).is_err());
    }

    #[test]
    fn test_expires_at_anchored_at_issue_time() {
        let issued_at = Utc::now();
        let response = parse(r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#)
            .unwrap();
        let token = TokenSet::from_response(response, issued_at);

        assert_eq!(token.expires_at, issued_at + Duration::seconds(3600));
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn test_zero_lifetime_expires_at_issue_time() {
        let issued_at = Utc::now();
        let response =
            parse(r#"{"access_token":"abc","token_type":"Bearer","expires_in":0}"#).unwrap();
        let token = TokenSet::from_response(response, issued_at);
        assert_eq!(token.expires_at, issued_at);
    }

    #[test]
    fn test_huge_lifetime_saturates() {
        let response = TokenResponse {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: u64::MAX,
            refresh_token: None,
            scope: None,
        };
        let token = TokenSet::from_response(response, Utc::now());
        assert_eq!(token.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_or_refresh_token() {
        let response = parse(r#"{"access_token":"new","token_type":"Bearer","expires_in":60}"#)
            .unwrap();
        let token = TokenSet::from_response(response, Utc::now())
            .or_refresh_token(Some("old-refresh".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));

        let response = parse(
            r#"{"access_token":"new","token_type":"Bearer","expires_in":60,"refresh_token":"rotated"}"#,
        )
        .unwrap();
        let token = TokenSet::from_response(response, Utc::now())
            .or_refresh_token(Some("old-refresh".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn test_request_context_is_random() {
        let a = OAuthRequestContext::generate();
        let b = OAuthRequestContext::generate();
        assert_ne!(a.state(), b.state());
        assert_eq!(a.state().len(), 32);
    }

    #[test]
    fn test_request_context_verify() {
        let ctx = OAuthRequestContext::generate();
        let state = ctx.state().to_string();
        assert!(ctx.clone().verify(&state));
        assert!(!ctx.clone().verify(&state.to_uppercase()));
        assert!(!ctx.verify(""));
    }
}
