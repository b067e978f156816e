// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Performance measurement: page vitals, component renders, and API latency.
//!
//! [`InstrumentedTransport`] is the opt-in HTTP middleware that feeds API
//! timings into a [`PerformanceMonitor`].

mod histogram;
mod monitor;
mod transport;

pub use histogram::{EndpointStats, EndpointSummary, Histogram, DEFAULT_BUCKETS_MS};
pub use monitor::{
    ApiMetric, ComponentMetric, PerformanceMetric, PerformanceMonitor, PerformanceSummary, Rating,
    VitalName,
};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, InstrumentedTransport, TRACEPARENT_HEADER};
