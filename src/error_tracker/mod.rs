// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error capture, fingerprinting, and batched delivery to a telemetry sink.

mod breadcrumbs;
mod fingerprint;
mod tracker;
mod types;

pub use breadcrumbs::BreadcrumbTrail;
pub use fingerprint::{fingerprint, FINGERPRINT_FRAMES};
pub use tracker::ErrorTracker;
pub use types::{Breadcrumb, ErrorContext, ErrorLevel, TrackedError};
