// Token endpoint grants (authorization code and refresh token)

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;

use super::types::{TokenResponse, TokenSet};
use crate::error::ApiError;

/// Percent-encode `key=value` pairs into a form body
pub(super) fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(super) fn authorization_code_body(
    code: &str,
    redirect_uri: &str,
    client_id: &str,
    client_secret: &str,
) -> String {
    form_body(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ])
}

pub(super) fn refresh_token_body(refresh_token: &str, client_id: &str, client_secret: &str) -> String {
    form_body(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ])
}

/// POST a form body to the token endpoint and parse the token set
///
/// `issued_at` is captured by the caller before the request is sent.
pub(super) async fn request_token(
    client: &Client,
    token_endpoint: &str,
    grant_type: &'static str,
    body: String,
    issued_at: DateTime<Utc>,
) -> Result<TokenSet, ApiError> {
    tracing::debug!(grant_type, url = %token_endpoint, "Sending token request");

    let response = client
        .post(token_endpoint)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            tracing::warn!(grant_type, error = %err, "Token request did not complete");
            err
        })?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            grant_type,
            status = status.as_u16(),
            body = %text,
            "Token request rejected"
        );

        // OAuth error bodies carry error/error_description
        if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(error_code) = error_json.get("error").and_then(|v| v.as_str()) {
                tracing::error!(
                    error = error_code,
                    description = error_json
                        .get("error_description")
                        .and_then(|v| v.as_str())
                        .unwrap_or(""),
                    "OAuth error details"
                );
            }
        }

        return Err(ApiError::HttpStatus {
            status: status.as_u16(),
            body: text,
        });
    }

    let data: TokenResponse =
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialization {
            message: e.to_string(),
            body: text.clone(),
        })?;

    if data.access_token.is_empty() {
        return Err(ApiError::Deserialization {
            message: "response does not contain access_token".to_string(),
            body: text,
        });
    }

    if !data.token_type.eq_ignore_ascii_case("bearer") {
        tracing::warn!(token_type = %data.token_type, "Unexpected token type");
    }

    let token = TokenSet::from_response(data, issued_at);

    tracing::info!(
        grant_type,
        expires_at = %token.expires_at.to_rfc3339(),
        has_refresh_token = token.refresh_token.is_some(),
        "Token issued"
    );

    Ok(token)
}
