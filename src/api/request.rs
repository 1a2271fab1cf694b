//! Outbound request descriptor and raw response

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A fully-described outbound call. Built once; a retry is a copy made with
/// [`ApiRequest::with_bearer`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub requires_auth: bool,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
            requires_auth: true,
            timeout,
        }
    }

    /// Attach a JSON body. Values that fail to serialize are sent as `null`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_value(body).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize request body: {}", e);
            serde_json::Value::Null
        }));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    pub fn with_bearer(&self, token: &str) -> Self {
        self.clone()
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Token from the `Authorization` header, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.header_value("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Status and body of a completed call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Locally produced 401 for calls that never reached the network.
    pub fn authentication_required() -> Self {
        let body = serde_json::json!({
            "success": false,
            "message": "Authentication required",
        });
        Self::new(StatusCode::UNAUTHORIZED, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_value(serde_json::Value::Null)
        } else {
            serde_json::from_slice(&self.body)
        }
    }
}
