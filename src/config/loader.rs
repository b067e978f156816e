// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.
//! Files are read as untyped values and deep-merged before deserialization, so
//! a workspace file can override a single nested field of the global one.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

use super::types::VigilConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &["vigil.json", ".vigil/config.json", "vigil.yaml", "vigil.yml"];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".vigil";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Load a configuration file (JSON or YAML) as an untyped value.
pub fn load_config_value(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let value: Value = match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    if !value.is_object() {
        return Err(ConfigError::InvalidFormat(format!(
            "{}: top level must be an object",
            path.display()
        )));
    }
    Ok(value)
}

/// Load and validate a single configuration file.
pub fn load_config_file(path: &Path) -> Result<VigilConfig, ConfigError> {
    let config: VigilConfig = serde_json::from_value(load_config_value(path)?)?;
    config.validate()?;
    Ok(config)
}

/// Find the workspace config file in `workspace_root`, if any.
pub fn find_workspace_config(workspace_root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.exists())
}

/// Load and merge global and workspace configuration.
///
/// Precedence: workspace > global > defaults.
pub fn load_config(workspace_root: &Path) -> Result<VigilConfig, ConfigError> {
    let global = get_global_config_path().filter(|p| p.exists());
    load_config_from(global.as_deref(), workspace_root)
}

/// [`load_config`] with an explicit global config path.
pub fn load_config_from(global: Option<&Path>, workspace_root: &Path) -> Result<VigilConfig, ConfigError> {
    let mut merged = Value::Object(Default::default());

    if let Some(path) = global {
        merge_values(&mut merged, load_config_value(path)?);
    }
    if let Some(path) = find_workspace_config(workspace_root) {
        tracing::debug!(path = %path.display(), "Loading workspace config");
        merge_values(&mut merged, load_config_value(&path)?);
    }

    let config: VigilConfig = serde_json::from_value(merged)?;
    config.validate()?;
    Ok(config)
}

/// Deep-merge `overlay` into `base`. Objects merge per key; everything else replaces.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Write a configuration file.
pub fn save_config(path: &Path, config: &VigilConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
