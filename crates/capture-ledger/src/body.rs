//! On-demand response-body retrieval.
//!
//! Capture sources only hand us headers; bodies are fetched separately by
//! replaying the recorded request (same method, headers, and body) against
//! its own URL. The fetch sits behind a trait so tests and offline replay
//! runs can swap the network out.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tapforge_core_types::{HeaderMap, PayloadKind};

use crate::error::LedgerError;

/// The request to replay.
#[derive(Clone, Debug)]
pub struct BodyProbe {
    pub url: String,
    pub method: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// What came back, with its shape tagged at ingestion.
#[derive(Clone, Debug)]
pub struct FetchedBody {
    pub status: u16,
    pub content: String,
    pub kind: PayloadKind,
}

#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn fetch(&self, probe: &BodyProbe) -> Result<FetchedBody, LedgerError>;
}

/// Replays the probe over HTTP.
pub struct HttpBodyFetcher {
    client: reqwest::Client,
}

impl HttpBodyFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::FetchFailed(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BodyFetcher for HttpBodyFetcher {
    async fn fetch(&self, probe: &BodyProbe) -> Result<FetchedBody, LedgerError> {
        let method = reqwest::Method::from_bytes(probe.method.as_bytes())
            .map_err(|_| LedgerError::FetchFailed(format!("invalid method {}", probe.method)))?;
        let mut request = self.client.request(method, &probe.url);
        for (name, value) in &probe.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &probe.body {
            request = request.body(body.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|err| LedgerError::FetchFailed(err.to_string()))?;
        let status = response.status().as_u16();
        let kind = PayloadKind::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
        );
        let content = response
            .text()
            .await
            .map_err(|err| LedgerError::FetchFailed(err.to_string()))?;
        Ok(FetchedBody {
            status,
            content,
            kind,
        })
    }
}

/// Hands back a fixed body for every probe. Lets replay runs and tests
/// exercise the enrichment path without touching the network.
#[derive(Clone, Debug)]
pub struct StaticFetcher {
    pub status: u16,
    pub content: String,
    pub kind: PayloadKind,
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self {
            status: 200,
            content: "{}".to_string(),
            kind: PayloadKind::Json,
        }
    }
}

#[async_trait]
impl BodyFetcher for StaticFetcher {
    async fn fetch(&self, _probe: &BodyProbe) -> Result<FetchedBody, LedgerError> {
        Ok(FetchedBody {
            status: self.status,
            content: self.content.clone(),
            kind: self.kind,
        })
    }
}
