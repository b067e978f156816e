// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP client seam with opt-in instrumentation.
//!
//! Call sites that want tracing wrap their transport in
//! [`InstrumentedTransport`], which propagates the active trace through a
//! `traceparent` header, runs the call in a client span, and records its
//! latency with the [`PerformanceMonitor`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::telemetry::{SpanKind, SpanOptions, SpanStatus, TracingManager};

use super::monitor::{ApiMetric, PerformanceMonitor};

/// Header carrying the W3C trace context.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// An outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json_body(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string().into_bytes());
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    /// Path of the URL without scheme, host, query, or fragment.
    pub fn endpoint(&self) -> &str {
        let rest = match self.url.find("://") {
            Some(i) => {
                let after = &self.url[i + 3..];
                match after.find('/') {
                    Some(slash) => &after[slash..],
                    None => "/",
                }
            }
            None => self.url.as_str(),
        };
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        &rest[..end]
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Request(e.to_string()))
    }
}

/// Sends HTTP requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Decorator adding trace propagation and latency recording to a transport.
pub struct InstrumentedTransport<T> {
    inner: T,
    tracer: Arc<TracingManager>,
    monitor: Arc<PerformanceMonitor>,
}

impl<T: HttpTransport> InstrumentedTransport<T> {
    pub fn new(inner: T, tracer: Arc<TracingManager>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            inner,
            tracer,
            monitor,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for InstrumentedTransport<T> {
    async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let endpoint = request.endpoint().to_string();
        let span_id = self.tracer.start_span(
            &format!("HTTP {}", request.method),
            SpanOptions::default()
                .kind(SpanKind::Client)
                .attribute("http.method", request.method.clone())
                .attribute("http.url", request.url.clone()),
        );
        if let Some(ctx) = self.tracer.span_context(span_id) {
            request
                .headers
                .insert(TRACEPARENT_HEADER.to_string(), ctx.to_traceparent());
        }

        let method = request.method.clone();
        let start = Instant::now();
        let result = self.inner.send(request).await;
        let elapsed = start.elapsed();

        let status = result.as_ref().ok().map(|r| r.status);
        self.monitor
            .record_api_metric(ApiMetric::new(method, endpoint, status, elapsed));

        match &result {
            Ok(response) => {
                self.tracer.set_span_attributes(
                    span_id,
                    BTreeMap::from([("http.status_code".to_string(), json!(response.status))]),
                );
                if response.status >= 400 {
                    let message = format!("HTTP {}", response.status);
                    self.tracer.end_span(span_id, SpanStatus::Error, Some(&message));
                } else {
                    self.tracer.end_span(span_id, SpanStatus::Ok, None);
                }
            }
            Err(e) => {
                self.tracer
                    .end_span(span_id, SpanStatus::Error, Some(&e.to_string()));
            }
        }
        result
    }
}

#[cfg(feature = "http")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_transport {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::{Client, Method};

    use super::{ApiRequest, ApiResponse, HttpTransport};
    use crate::error::TransportError;

    /// [`HttpTransport`] backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
        timeout: Option<Duration>,
    }

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self::with_client(Client::new())
        }

        pub fn with_client(client: Client) -> Self {
            Self {
                client,
                timeout: None,
            }
        }

        /// Per-request deadline.
        pub fn timeout(mut self, timeout: Duration) -> Self {
            self.timeout = Some(timeout);
            self
        }
    }

    impl Default for ReqwestTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            let method = Method::from_bytes(request.method.as_bytes())
                .map_err(|e| TransportError::Request(format!("Invalid method {}: {}", request.method, e)))?;

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await.map_err(|e| match (e.is_timeout(), self.timeout) {
                (true, Some(t)) => TransportError::Timeout(u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
                _ => TransportError::from(e),
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
                .collect();
            let body = response.bytes().await?.to_vec();

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        }
    }
}
