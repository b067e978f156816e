// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `tracing` subscriber initialization.

use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Guard that flushes telemetry on drop.
///
/// Keep this guard alive for the duration of your program.
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // fmt layers write synchronously; nothing buffered to flush yet
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    // RUST_LOG wins over the configured level; an explicit directive wins over both
    match &config.filter {
        Some(directive) => {
            EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(&config.level))
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
    }
}

/// Initialize the global `tracing` subscriber.
///
/// This should be called once at application startup.
///
/// # Example
///
/// ```rust,ignore
/// use vigil::config::LoggingConfig;
/// use vigil::telemetry::init_telemetry;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let _guard = init_telemetry(&LoggingConfig::production())?;
///     Ok(())
/// }
/// ```
pub fn init_telemetry(config: &LoggingConfig) -> io::Result<TelemetryGuard> {
    let filter = build_filter(config);
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Compact => registry
            .with(fmt::layer().with_ansi(config.ansi).with_target(true).compact())
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_ansi(config.ansi)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .flatten_event(true),
            )
            .try_init(),
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter_wins() {
        let config = LoggingConfig::default().with_filter("vigil=trace");
        let filter = build_filter(&config);
        assert_eq!(filter.to_string(), "vigil=trace");
    }

    #[test]
    fn test_bad_filter_falls_back_to_level() {
        let config = LoggingConfig::default().with_level("warn").with_filter("vigil=notalevel");
        let filter = build_filter(&config);
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_init_twice_errors() {
        let config = LoggingConfig::default();
        let first = init_telemetry(&config);
        let second = init_telemetry(&config);
        // Another test may have installed a subscriber first; at most one succeeds.
        assert!(!(first.is_ok() && second.is_ok()));
    }
}
