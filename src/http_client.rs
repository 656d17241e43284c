use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;

use crate::error::{require_arg, ApiError};

/// Default request timeout for the shared transport (seconds)
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

/// Build the shared HTTP transport with connection pooling
pub fn build_transport(connect_timeout: u64, request_timeout: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

/// Bearer-authenticated JSON client for the resource API
///
/// The access token is supplied on every call; the client never stores or
/// refreshes tokens and never retries.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    api_base_url: String,
}

/// Reject `.`/`..` path segments, which would let the URL escape the base path
///
/// reqwest normalizes dot segments (also `%2e` and `\` separators) when it
/// parses the joined URL. The query string and fragment are not checked.
fn check_endpoint_path(endpoint: &str) -> Result<(), ApiError> {
    let path = endpoint
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let escapes = path.split(|c: char| c == '/' || c == '\\').any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    });

    if escapes {
        return Err(ApiError::ValidationError(format!(
            "Endpoint must not contain dot segments: {}",
            endpoint
        )));
    }
    Ok(())
}

impl ApiClient {
    pub fn new(client: Client, api_base_url: impl Into<String>) -> Result<Self, ApiError> {
        let api_base_url = api_base_url.into();
        if api_base_url.is_empty() {
            return Err(ApiError::ConfigError(
                "api_base_url must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client,
            api_base_url,
        })
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// `<api_base_url>/<endpoint>`, joined as-is
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_base_url, endpoint)
    }

    pub async fn get(&self, endpoint: &str, access_token: &str) -> Result<String, ApiError> {
        let (_, body) = self.send(Method::GET, endpoint, access_token, None).await?;
        Ok(body)
    }

    /// POST a JSON body; `None` is sent as an empty body
    pub async fn post(
        &self,
        endpoint: &str,
        access_token: &str,
        json_body: Option<&str>,
    ) -> Result<String, ApiError> {
        let body = json_body.unwrap_or_default().to_string();
        let (_, body) = self
            .send(Method::POST, endpoint, access_token, Some(body))
            .await?;
        Ok(body)
    }

    /// PUT a JSON body; `None` is sent as an empty body
    pub async fn put(
        &self,
        endpoint: &str,
        access_token: &str,
        json_body: Option<&str>,
    ) -> Result<String, ApiError> {
        let body = json_body.unwrap_or_default().to_string();
        let (_, body) = self
            .send(Method::PUT, endpoint, access_token, Some(body))
            .await?;
        Ok(body)
    }

    /// Returns `true` on a success status; failures surface as errors
    pub async fn delete(&self, endpoint: &str, access_token: &str) -> Result<bool, ApiError> {
        let (status, _) = self
            .send(Method::DELETE, endpoint, access_token, None)
            .await?;
        Ok(status.is_success())
    }

    pub async fn get_company_information(&self, access_token: &str) -> Result<String, ApiError> {
        self.get("companyinformation", access_token).await
    }

    pub async fn get_customers(&self, access_token: &str) -> Result<String, ApiError> {
        self.get("customers", access_token).await
    }

    pub async fn get_invoices(&self, access_token: &str) -> Result<String, ApiError> {
        self.get("invoices", access_token).await
    }

    /// Probe the API with the given token; any failure reads as `false`
    pub async fn test_connection(&self, access_token: &str) -> bool {
        match self.get_company_information(access_token).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error_kind = ?e.kind(), "Connection test failed: {}", e);
                false
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        body: Option<String>,
    ) -> Result<(StatusCode, String), ApiError> {
        require_arg("Endpoint", endpoint)?;
        require_arg("Access token", access_token)?;
        check_endpoint_path(endpoint)?;

        let url = self.url_for(endpoint);
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json; charset=utf-8")
                .body(body);
        }

        let response = request.send().await.map_err(|e| {
            let err = ApiError::from(e);
            tracing::warn!(method = %method, url = %url, error = %err, "HTTP request error");
            err
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                method = %method,
                status = status.as_u16(),
                url = %url,
                response_body = %text,
                "HTTP request failed with error response"
            );
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        tracing::debug!(status = %status, "Request successful");
        Ok((status, text))
    }
}
