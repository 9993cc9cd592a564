//! HTTP client for talking to a node's `/query` endpoint.
//!
//! Used by replication to forward requests to peers and by the `send`
//! subcommand for ad-hoc statements.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::protocol::{Record, Request};

/// Upper bound for a single call, including reading the response body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("{addr} unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{addr} answered {status}: {body}")]
    Rejected {
        addr: String,
        status: StatusCode,
        body: String,
    },
    #[error("{addr} returned an unreadable row set: {source}")]
    Decode {
        addr: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PeerError {
    /// Status code of a non-2xx answer, if the node answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PeerError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Posts `request` to the node at `addr` and returns the raw response
    /// body. Non-2xx answers become [`PeerError::Rejected`].
    pub async fn send(&self, addr: &str, request: &Request) -> Result<String, PeerError> {
        let unreachable = |source| PeerError::Unreachable {
            addr: addr.to_string(),
            source,
        };

        let url = format!("{}/query", addr.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        let body = response.text().await.map_err(unreachable)?;
        if !status.is_success() {
            return Err(PeerError::Rejected {
                addr: addr.to_string(),
                status,
                body: body.trim_end().to_string(),
            });
        }

        Ok(body)
    }

    /// Sends a `query` request and decodes the returned rows.
    pub async fn fetch(&self, addr: &str, request: &Request) -> Result<Vec<Record>, PeerError> {
        let body = self.send(addr, request).await?;
        serde_json::from_str(&body).map_err(|source| PeerError::Decode {
            addr: addr.to_string(),
            source,
        })
    }
}
