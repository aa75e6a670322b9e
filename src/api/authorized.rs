//! Authorized requests for the rest of the application
//!
//! Components that talk to the trading journal API never see tokens. They go
//! through [`AuthorizedClient`], which attaches the current access token and
//! routes any `401` into a forced logout so the whole application observes
//! the dead session at once.

use crate::api::client::{check_status, endpoint, read_json, HttpSessionApi};
use crate::api::errors::ApiError;
use crate::credentials::CredentialStore;
use crate::session::SessionLifecycleManager;
use log::{debug, warn};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Bearer-authenticated JSON client bound to a lifecycle manager
#[derive(Clone)]
pub struct AuthorizedClient {
    client: reqwest::Client,
    base_url: Url,
    manager: Arc<SessionLifecycleManager>,
}

impl AuthorizedClient {
    /// Share the HTTP client and base URL of `api`
    #[must_use]
    pub fn new(api: &HttpSessionApi, manager: Arc<SessionLifecycleManager>) -> Self {
        Self {
            client: api.http_client().clone(),
            base_url: api.base_url().clone(),
            manager,
        }
    }

    /// `GET` a JSON resource
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] when signed out or rejected (the
    /// latter also forces a logout), or another variant on failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path)?;
        let response = self.send(request).await?;
        read_json(response).await
    }

    /// `POST` a JSON body and decode the JSON response
    ///
    /// # Errors
    ///
    /// Same as [`AuthorizedClient::get_json`].
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path)?.json(body);
        let response = self.send(request).await?;
        read_json(response).await
    }

    /// `DELETE` a resource, ignoring any response body
    ///
    /// # Errors
    ///
    /// Same as [`AuthorizedClient::get_json`].
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, path)?;
        let response = self.send(request).await?;
        check_status(response).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let Some(tokens) = self.manager.credentials().get() else {
            debug!("Refusing {method} {path}: no stored credentials");
            return Err(ApiError::Unauthorized);
        };
        let url = endpoint(&self.base_url, path)?;
        debug!("{method} {url}");
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(tokens.access_token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Request rejected with 401, forcing logout");
            self.manager.force_logout().await;
            return Err(ApiError::Unauthorized);
        }
        Ok(response)
    }
}
