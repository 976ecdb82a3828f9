//! Control plane client.
//!
//! The [`ControlPlane`] trait is what the reconcile loop and the sender
//! workers depend on. [`HttpControlPlane`] speaks the JSON-over-HTTP API:
//!
//! - `POST {server_url}/rule` with `{"tenant":T,"rules":[{"table":TABLE}]}`
//! - `POST {server_url}/rule/stat` with `{"tenant":T,"stats":[...]}`
//!
//! Request bodies are gzip-encoded when compression is enabled, and gzip
//! responses are decoded before parsing. Any status other than 200 is an error.

use std::future::Future;
use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use tracing::debug;

use befw_core::types::{PolicyDocument, StatsReport};

use crate::error::AgentError;

const POLICY_PATH: &str = "/rule";
const STATS_PATH: &str = "/rule/stat";

/// Operations the agent needs from the control plane.
///
/// `Send + Sync + 'static` so one client can be shared by the reconcile
/// tasks and every sender worker.
pub trait ControlPlane: Send + Sync + 'static {
    /// Fetches the full rule list of `tenant` for `table`.
    fn fetch_policy(
        &self,
        tenant: &str,
        table: &str,
    ) -> impl Future<Output = Result<PolicyDocument, AgentError>> + Send;

    /// Reports per-rule counter deltas. Only success or failure matters.
    fn report_stats(
        &self,
        report: &StatsReport,
    ) -> impl Future<Output = Result<(), AgentError>> + Send;
}

/// HTTP implementation of [`ControlPlane`] backed by `reqwest`.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
    compress: bool,
    fetch_timeout: Duration,
    report_timeout: Duration,
}

impl HttpControlPlane {
    /// Creates a client for `base_url` (e.g. `http://127.0.0.1:8080/api/v1`).
    ///
    /// Each fetch is bounded by `fetch_timeout` and each report by
    /// `report_timeout`.
    pub fn new(
        base_url: impl Into<String>,
        compress: bool,
        fetch_timeout: Duration,
        report_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::Request(format!("failed to build http client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self {
            client,
            base_url,
            compress,
            fetch_timeout,
            report_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Bytes, AgentError> {
        let payload = serde_json::to_vec(body).map_err(|e| AgentError::Encode(e.to_string()))?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT_ENCODING, "gzip");
        request = if self.compress {
            request
                .header(CONTENT_ENCODING, "gzip")
                .body(gzip_encode(&payload)?)
        } else {
            request.body(payload)
        };

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AgentError::Status(status.as_u16()));
        }

        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));
        let body = response
            .bytes()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;
        debug!(url = %url, bytes = body.len(), gzipped, "response received");

        if gzipped {
            Ok(Bytes::from(gzip_decode(&body)?))
        } else {
            Ok(body)
        }
    }
}

impl ControlPlane for HttpControlPlane {
    async fn fetch_policy(&self, tenant: &str, table: &str) -> Result<PolicyDocument, AgentError> {
        let query = PolicyDocument::policy_query(tenant, table);
        let body = self
            .post_json(POLICY_PATH, &query, self.fetch_timeout)
            .await?;
        serde_json::from_slice(&body).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn report_stats(&self, report: &StatsReport) -> Result<(), AgentError> {
        self.post_json(STATS_PATH, report, self.report_timeout)
            .await?;
        Ok(())
    }
}

fn gzip_encode(data: &[u8]) -> Result<Vec<u8>, AgentError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| AgentError::Encode(format!("gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| AgentError::Encode(format!("gzip: {e}")))
}

fn gzip_decode(data: &[u8]) -> Result<Vec<u8>, AgentError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AgentError::Decode(format!("gzip: {e}")))?;
    Ok(out)
}
