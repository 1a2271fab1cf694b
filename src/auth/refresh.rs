//! Single-flight access token refresh
//!
//! Every caller that asks for a refresh while one is pending awaits the same
//! shared future, so one network exchange serves all of them and they all see
//! the same outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde::Deserialize;

use super::events::SessionObserver;
use super::tokens::{Credential, CredentialStore};
use crate::api::envelope;
use crate::api::error::ErrorBody;
use crate::api::request::ApiRequest;
use crate::api::transport::Transport;

/// Server message that marks the refresh token as permanently rejected.
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

type PendingRefresh = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    observer: Arc<dyn SessionObserver>,
    refresh_url: String,
    timeout: Duration,
    pending: Mutex<Option<PendingRefresh>>,
}

/// Owns the refresh state for one session.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        observer: Arc<dyn SessionObserver>,
        refresh_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                observer,
                refresh_url: refresh_url.into(),
                timeout,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Returns the new access token, or `None` when there is no refresh token
    /// or the exchange failed. Joins the pending exchange if there is one.
    pub async fn refresh(&self) -> Option<String> {
        let pending = {
            let mut slot = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let pending = async move {
                        let outcome = inner.exchange().await;
                        inner
                            .pending
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Inner {
    async fn exchange(&self) -> Option<String> {
        let Some(refresh_token) = self.store.refresh_token() else {
            tracing::debug!("No refresh token stored, skipping refresh");
            return None;
        };

        tracing::info!("Refreshing access token...");
        let request = ApiRequest::new(Method::POST, &self.refresh_url, self.timeout)
            .public()
            .json(&serde_json::json!({ "refreshToken": refresh_token }));

        let resp = match tokio::time::timeout(self.timeout, self.transport.send(&request)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::error!("Token refresh failed: {}", e);
                return None;
            }
            Err(_) => {
                tracing::error!("Token refresh timed out after {:?}", self.timeout);
                return None;
            }
        };

        if !resp.is_success() {
            let body = ErrorBody::from_response(&resp);
            if body.message.as_deref() == Some(INVALID_REFRESH_TOKEN) {
                tracing::warn!("Refresh token rejected, ending session");
                self.store.clear();
                self.observer.session_expired();
            } else {
                tracing::warn!(
                    "Token refresh returned HTTP {}: {}",
                    resp.status.as_u16(),
                    body.message.unwrap_or_default()
                );
            }
            return None;
        }

        let tokens: RefreshResponse = match resp.json().and_then(envelope::decode_lenient) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!("Unexpected token refresh response: {}", e);
                return None;
            }
        };

        self.store
            .set(&Credential::new(tokens.access_token.clone(), tokens.refresh_token));
        tracing::info!("Access token refreshed");
        Some(tokens.access_token)
    }
}
