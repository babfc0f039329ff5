//! Configuration loading.
//!
//! Mirrors the layered XDG lookup used elsewhere in this codebase's lineage:
//! system data dirs, then system config dirs, then the user config dir, each
//! layer overriding the previous one. Everything has a compiled-in default,
//! so a missing or partially-specified file is never fatal.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use xdg::BaseDirectories;

use crate::error::ConfigError;

const XDG_PREFIX: &str = "gmenu-proxy";
const CONFIG_FILENAME: &str = "config.toml";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`).
    /// `RUST_LOG`, if set, still takes precedence.
    pub log_level: String,
    /// Well-known D-Bus service name this daemon claims.
    pub service_name: String,
    /// Window-discovery poll interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Whether to patch GTK settings files at startup to load
    /// `appmenu-gtk-module`.
    pub write_gtk_settings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            service_name: "org.gmenuproxy.Proxy".to_string(),
            poll_interval_ms: 500,
            write_gtk_settings: true,
        }
    }
}

impl Config {
    /// Load configuration from the standard XDG locations, falling back to
    /// defaults for anything unset or entirely absent.
    ///
    /// Order (later overrides earlier): system data dirs, system config
    /// dirs, user config dir.
    pub fn load() -> Result<Self, ConfigError> {
        let xdg_dirs = BaseDirectories::with_prefix(XDG_PREFIX)?;
        let mut config = Config::default();

        for path in xdg_dirs.find_data_files(CONFIG_FILENAME).rev() {
            config.merge_file(&path)?;
        }
        for path in xdg_dirs.find_config_files(CONFIG_FILENAME).rev() {
            config.merge_file(&path)?;
        }
        if let Some(user_path) = xdg_dirs.find_config_file(CONFIG_FILENAME) {
            config.merge_file(&user_path)?;
        }

        Ok(config)
    }

    /// Load configuration from an explicit path only (used for `--config`),
    /// still seeded with compiled-in defaults for anything the file omits.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.merge_file(path)?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source: err,
                })
            }
        };

        let parsed: PartialConfig = toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            source: err,
        })?;

        if let Some(log_level) = parsed.log_level {
            self.log_level = log_level;
        }
        if let Some(service_name) = parsed.service_name {
            self.service_name = service_name;
        }
        if let Some(poll_interval_ms) = parsed.poll_interval_ms {
            self.poll_interval_ms = poll_interval_ms;
        }
        if let Some(write_gtk_settings) = parsed.write_gtk_settings {
            self.write_gtk_settings = write_gtk_settings;
        }

        Ok(())
    }
}

/// Same fields as [`Config`] but all optional, so a partial file only
/// overrides the keys it mentions.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    log_level: Option<String>,
    service_name: Option<String>,
    poll_interval_ms: Option<u64>,
    write_gtk_settings: Option<bool>,
}

/// Resolve the user's gtk-3.0 settings.ini path, creating parent
/// directories lazily is left to the caller.
pub fn gtk3_settings_path() -> PathBuf {
    dirs_config_home().join("gtk-3.0").join("settings.ini")
}

/// Resolve the user's gtk-2.0 gtkrc path.
pub fn gtk2_settings_path() -> PathBuf {
    dirs_config_home().join("gtk-2.0").join("gtkrc")
}

fn dirs_config_home() -> PathBuf {
    BaseDirectories::new()
        .ok()
        .map(|d| d.get_config_home())
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
            PathBuf::from(home).join(".config")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert!(config.poll_interval_ms > 0);
        assert!(config.write_gtk_settings);
    }

    #[test]
    fn partial_file_only_overrides_mentioned_keys() {
        let dir = std::env::temp_dir().join(format!("gmenu-proxy-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_name, Config::default().service_name);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
