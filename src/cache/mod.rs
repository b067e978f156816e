// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Query caching and request deduplication.
//!
//! - [`RequestDeduper`] collapses concurrent identical requests into one execution.
//! - [`QueryCache`] puts a TTL + size-bounded cache and a metrics ring in front
//!   of caller-supplied fetch functions, optionally routing through the deduper.

mod dedup;
mod metrics;
mod query;

pub use dedup::{DedupStats, InFlight, RequestDeduper};
pub use metrics::{MetricsRing, QueryAnalytics, QueryMetric};
pub use query::{BatchQuery, CacheStats, QueryCache, QueryOptions, QueryOutcome, QueryResponse};
