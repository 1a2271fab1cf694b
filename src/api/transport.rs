//! Network transport
//!
//! The request pipeline talks to the network only through [`Transport`], so the
//! refresh and retry logic can be driven by a scripted transport in tests.

use async_trait::async_trait;

use super::error::TransportError;
use super::request::{ApiRequest, ApiResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange. Timeouts are applied by the caller.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        tracing::debug!("{} {}", request.method, request.url);

        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        tracing::debug!("{} {} -> {}", request.method, request.url, status.as_u16());

        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
