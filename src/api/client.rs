//! Session API client
//!
//! Thin wrapper over the remote session endpoints:
//!
//! - `GET  session/info`   - current [`SessionInfo`]
//! - `POST session/extend` - rotate the token pair and return fresh info
//! - `POST session/revoke` - best-effort server-side logout
//! - `POST auth/login`     - exchange user credentials for a token pair

use crate::api::errors::ApiError;
use crate::models::{ExtendResponse, SessionInfo, TokenPair};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const SESSION_INFO_PATH: &str = "session/info";
const SESSION_EXTEND_PATH: &str = "session/extend";
const SESSION_REVOKE_PATH: &str = "session/revoke";
const LOGIN_PATH: &str = "auth/login";

/// Remote session operations consumed by the lifecycle manager
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Fetch the server's current view of the session
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] when the session is already invalid,
    /// or another variant for transport and server failures.
    async fn fetch_session_info(&self, access_token: &str) -> Result<SessionInfo, ApiError>;

    /// Exchange the refresh token for a new token pair and fresh session info
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh is rejected or the request fails.
    async fn extend_session(&self, tokens: &TokenPair) -> Result<ExtendResponse, ApiError>;

    /// Revoke the session server-side
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; callers treat this as best-effort.
    async fn revoke_session(&self, tokens: &TokenPair) -> Result<(), ApiError>;
}

/// Credential login used by the auth context
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Authenticate a user and obtain a fresh token pair
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for rejected credentials.
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// `reqwest` implementation of [`SessionApi`] and [`AuthApi`]
#[derive(Clone, Debug)]
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSessionApi {
    /// Create a client for the API rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] if the URL cannot serve as a base
    /// or the HTTP client cannot be built.
    pub fn new(base_url: &Url, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("tradelog-session/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Configuration(e.to_string()))?;

        Self::with_client(client, base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] if the URL cannot serve as a base.
    pub fn with_client(client: reqwest::Client, base_url: &Url) -> Result<Self, ApiError> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client, shared with the authorized client
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn post_refresh<T: DeserializeOwned>(
        &self,
        path: &str,
        tokens: &TokenPair,
    ) -> Result<Option<T>, ApiError> {
        let url = endpoint(&self.base_url, path)?;
        debug!("POST {url}");

        let response = self
            .client
            .post(url)
            .bearer_auth(&tokens.access_token)
            .json(&RefreshRequest {
                refresh_token: &tokens.refresh_token,
            })
            .send()
            .await?;

        let response = check_status(response).await?;
        if response.content_length() == Some(0) {
            return Ok(None);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn fetch_session_info(&self, access_token: &str) -> Result<SessionInfo, ApiError> {
        let url = endpoint(&self.base_url, SESSION_INFO_PATH)?;
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        read_json(response).await
    }

    async fn extend_session(&self, tokens: &TokenPair) -> Result<ExtendResponse, ApiError> {
        self.post_refresh(SESSION_EXTEND_PATH, tokens)
            .await?
            .ok_or_else(|| ApiError::Decode("empty extend response".to_string()))
    }

    async fn revoke_session(&self, tokens: &TokenPair) -> Result<(), ApiError> {
        // Revocation bodies are informational only
        self.post_refresh::<serde_json::Value>(SESSION_REVOKE_PATH, tokens)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl AuthApi for HttpSessionApi {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = endpoint(&self.base_url, LOGIN_PATH)?;
        debug!("POST {url} for user {username}");

        let response = self
            .client
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        read_json(response).await
    }
}

/// Ensure the base URL ends with a slash so relative joins append segments
pub(crate) fn normalize_base_url(base_url: &Url) -> Result<Url, ApiError> {
    if base_url.cannot_be_a_base() {
        return Err(ApiError::Configuration(format!(
            "API base URL cannot be used as a base: {base_url}"
        )));
    }

    let mut url = base_url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve an API path relative to the (normalized) base URL
pub(crate) fn endpoint(base_url: &Url, path: &str) -> Result<Url, ApiError> {
    base_url
        .join(path.trim_start_matches('/'))
        .map_err(|e| ApiError::Configuration(format!("Invalid API path '{path}': {e}")))
}

/// Turn non-2xx responses into classified errors
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("Request failed with status {status}");
    Err(ApiError::from_status(status.as_u16(), &body))
}

/// Check the status and decode a JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_appends_slash() {
        let url = Url::parse("https://journal.example.com/api/v1").unwrap();
        let normalized = normalize_base_url(&url).unwrap();
        assert_eq!(normalized.as_str(), "https://journal.example.com/api/v1/");
    }

    #[test]
    fn test_normalize_base_url_keeps_existing_slash() {
        let url = Url::parse("https://journal.example.com/api/").unwrap();
        let normalized = normalize_base_url(&url).unwrap();
        assert_eq!(normalized.as_str(), "https://journal.example.com/api/");
    }

    #[test]
    fn test_normalize_rejects_non_base_url() {
        let url = Url::parse("mailto:ops@example.com").unwrap();
        assert!(matches!(
            normalize_base_url(&url),
            Err(ApiError::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let base = normalize_base_url(&Url::parse("https://journal.example.com/api").unwrap())
            .unwrap();
        assert_eq!(
            endpoint(&base, SESSION_INFO_PATH).unwrap().as_str(),
            "https://journal.example.com/api/session/info"
        );
        assert_eq!(
            endpoint(&base, "/trades").unwrap().as_str(),
            "https://journal.example.com/api/trades"
        );
    }

    #[test]
    fn test_client_construction() {
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        let api = HttpSessionApi::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url().as_str(), "http://127.0.0.1:8080/");
    }
}
