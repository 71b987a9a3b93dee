//! Timeout-bounded HTTP delivery.
//!
//! One `POST` per call, no internal retries: retry policy belongs to the
//! caller, and here that policy is "none". A failed batch surfaces to the
//! batch processor, gets logged, and is permanently lost. The state machine
//! is ACTIVE → SHUTDOWN, one-way and idempotent; after shutdown every send
//! fails immediately without touching the network.

use crate::sdk::InitError;
use minotel::exporter::ExportError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default per-attempt delivery timeout.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(15);

/// Posts wire bodies to one endpoint under a timeout.
pub struct HttpDelivery {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
    shut_down: AtomicBool,
}

impl HttpDelivery {
    /// Builds a delivery channel for `url`.
    ///
    /// Caller-supplied headers are installed first and the fixed
    /// `content-type: application/json` last, so callers can never override
    /// it.
    pub fn new(
        url: impl Into<String>,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, InitError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| InitError::InvalidHeader {
                    name: name.clone(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| InitError::InvalidHeader {
                    name: name.clone(),
                })?;
            header_map.insert(header_name, header_value);
        }
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InitError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            headers: header_map,
            timeout,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Sends one body. Exactly one attempt:
    ///
    /// - elapsed timeout cancels the in-flight request and yields
    ///   [`ExportError::Timeout`]
    /// - a non-2xx response yields [`ExportError::Rejected`] with the status
    /// - network-level failures yield [`ExportError::Transport`]
    /// - after [`HttpDelivery::shutdown`], fails immediately with
    ///   [`ExportError::ShutdownInProgress`] and no I/O
    pub async fn send(&self, body: String) -> Result<(), ExportError> {
        if self.is_shut_down() {
            return Err(ExportError::ShutdownInProgress);
        }

        let request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send();

        // Dropping the request future on timeout aborts the in-flight call
        let response = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => return Err(ExportError::Timeout),
            Ok(Err(e)) => return Err(ExportError::Transport(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Transitions ACTIVE → SHUTDOWN. One-way; repeated calls are no-ops.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
