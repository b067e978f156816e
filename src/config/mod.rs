// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for Vigil.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.vigil/config.json
//! - Workspace config: vigil.json, .vigil/config.json, or vigil.yaml
//!
//! Configuration is merged with precedence (workspace > global > defaults).

mod loader;
mod types;

pub use loader::{
    find_workspace_config, get_global_config_path, load_config, load_config_file,
    load_config_from, load_config_value, merge_values, save_config, CONFIG_FILES,
    GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use types::{
    default_windows, CacheConfig, ErrorTrackerConfig, LogFormat, LoggingConfig,
    PerformanceConfig, SinkConfig, SloConfig, VigilConfig,
};
