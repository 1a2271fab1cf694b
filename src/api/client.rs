//! Authenticated HTTP client for the admin API
//!
//! Every call goes through [`ApiClient::execute`]: bearer injection, refresh
//! before expiry, and one refresh-and-retry on 401.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::ApiError;
use super::request::{ApiRequest, ApiResponse};
use super::transport::Transport;
use crate::auth::jwt;
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::{CredentialStore, SessionObserver};
use crate::config::Settings;

const REFRESH_PATH: &str = "/auth/refresh-token";

/// Client shared by the session and the resource services.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    refresher: RefreshCoordinator,
    settings: Arc<Settings>,
}

impl ApiClient {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let refresher = RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            observer,
            settings.endpoint(REFRESH_PATH),
            settings.request_timeout(),
        );
        Self {
            transport,
            store,
            refresher,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Request against the configured base URL with the default timeout.
    pub fn request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, self.settings.endpoint(path), self.settings.request_timeout())
    }

    /// Run a request through the auth pipeline.
    ///
    /// Non-2xx responses are returned as-is; only transport failures and
    /// timeouts are errors here.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if !request.requires_auth {
            return self.send(&request).await;
        }

        let mut token = self.store.access_token();
        let buffer = self.settings.token_expiry_buffer_secs;
        if token.is_some() && jwt::is_expired(token.as_deref(), buffer) {
            tracing::debug!("Access token expired or expiring, refreshing before {}", request.url);
            token = self.refresher.refresh().await;
        }

        let Some(token) = token else {
            tracing::debug!("No usable access token for {}", request.url);
            return Ok(ApiResponse::authentication_required());
        };

        let request = request.with_bearer(&token);
        let resp = self.send(&request).await?;
        if !resp.is_unauthorized() {
            return Ok(resp);
        }

        tracing::info!("401 from {}, refreshing token and retrying once", request.url);
        match self.refresher.refresh().await {
            Some(fresh) => self.send(&request.with_bearer(&fresh)).await,
            None => Ok(resp),
        }
    }

    /// Send without any auth handling, bounded by the request timeout.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        match tokio::time::timeout(request.timeout, self.transport.send(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!("{} {} timed out", request.method, request.url);
                Err(ApiError::Timeout(request.timeout))
            }
        }
    }

    /// Execute and decode a 2xx body as `T`, classifying everything else.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let resp = self.execute(request).await?;
        if !resp.is_success() {
            return Err(ApiError::from_response(&resp));
        }
        Ok(resp.json()?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(self.request(Method::GET, path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self.call(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}
