// src/services/provider_transport.rs
//! HTTP transport used by the generation proxy

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::RETRY_AFTER, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Raw provider reply: status code plus undecoded body
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &Value,
    ) -> Result<ProviderReply, TransportError>;
}

/// `reqwest`-backed transport with a whole-request timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &Value,
    ) -> Result<ProviderReply, TransportError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.bytes().await?;

        debug!(url = %url, status = status, body_len = body.len(), "Provider replied");

        Ok(ProviderReply {
            status,
            retry_after,
            body,
        })
    }
}
