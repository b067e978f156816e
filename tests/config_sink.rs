// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration files driving a fully wired runtime.

use std::fs;

use tempfile::TempDir;

use vigil::config::{load_config_from, SinkConfig};
use vigil::error_tracker::ErrorLevel;
use vigil::slo::Severity;
use vigil::Vigil;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_workspace_overrides_global() {
    let global_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let global = global_dir.path().join("config.json");
    fs::write(
        &global,
        r#"{"cache": {"maxSize": 500, "slowQueryMs": 250}, "logging": {"service": "ops"}}"#,
    )
    .unwrap();
    fs::write(
        workspace.path().join("vigil.yaml"),
        "cache:\n  maxSize: 42\nslo:\n  objectives:\n    - name: invoices\n      target: 0.999\n",
    )
    .unwrap();

    let config = load_config_from(Some(&global), workspace.path()).unwrap();
    assert_eq!(config.cache.max_size, 42);
    assert_eq!(config.cache.slow_query_ms, 250);
    assert_eq!(config.logging.service, "ops");
    assert_eq!(config.slo.objectives.len(), 1);
    assert_eq!(config.slo.objectives[0].window, "30d");
    assert_eq!(config.slo.windows.len(), 4);
}

#[test]
fn test_invalid_target_rejected_at_load() {
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("vigil.json"),
        r#"{"slo": {"objectives": [{"name": "api", "target": 1.5}]}}"#,
    )
    .unwrap();

    assert!(load_config_from(None, workspace.path()).is_err());
}

#[test]
fn test_custom_windows_from_file() {
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("vigil.json"),
        r#"{"slo": {"windows": [{"label": "5m", "threshold": 20.0, "severity": "critical"}]}}"#,
    )
    .unwrap();

    let config = load_config_from(None, workspace.path()).unwrap();
    assert_eq!(config.slo.windows.len(), 1);
    assert_eq!(config.slo.windows[0].severity, Severity::Critical);
}

// ============================================================================
// SQLite sink
// ============================================================================

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_runtime_persists_to_sqlite() {
    use vigil::sink::SqliteSink;

    let workspace = TempDir::new().unwrap();
    let db = workspace.path().join("telemetry").join("vigil.db");
    fs::write(
        workspace.path().join("vigil.json"),
        serde_json::json!({
            "sink": {"kind": "sqlite", "path": db},
            "slo": {"objectives": [{"name": "api", "target": 0.99}]}
        })
        .to_string(),
    )
    .unwrap();

    let config = load_config_from(None, workspace.path()).unwrap();
    assert_eq!(config.sink, SinkConfig::Sqlite { path: db.clone() });

    let vigil = Vigil::from_config(config).unwrap();
    vigil.start().unwrap();
    vigil.logger().info("well record loaded", None);
    vigil.errors().capture_message("uwi lookup failed", ErrorLevel::Error);
    vigil.slo().record_error("api").unwrap();
    vigil.shutdown().await.unwrap();

    let reopened = SqliteSink::open(&db).unwrap();
    assert_eq!(reopened.count("error_logs").unwrap(), 1);
    assert_eq!(reopened.count("slo_violations").unwrap(), 4);
    assert!(reopened.count("logs").unwrap() >= 1);
}
