//! Runtime configuration, loaded once at startup from a JSON file.
//!
//! Resolution order: `--config <path>`, then `$CONFIG_PATH`, then
//! `config.json` in the working directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://moneyforward.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub moneyforward: Moneyforward,
    #[serde(default)]
    pub proxy: Option<Proxy>,
    #[serde(default)]
    pub browser: Browser,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Moneyforward {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub mail_address: String,
    pub password: String,
}

/// Outbound proxy; credentials are answered to the browser's auth challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct Proxy {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Browser {
    pub headless: bool,
    /// Chrome/Chromium binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    /// Extra launch args appended after the built-in hardening set.
    pub args: Vec<String>,
    /// Pause inserted after every driver interaction.
    pub slow_mo_ms: u64,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Browser {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            args: Vec::new(),
            slow_mo_ms: 100,
            viewport: Viewport::default(),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl Config {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.json")),
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.moneyforward.base_url
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "moneyforward": { "mail_address": "a@example.com", "password": "secret" } }"#,
        )
        .unwrap();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert!(config.proxy.is_none());
        assert!(config.browser.headless);
        assert_eq!(config.browser.slow_mo_ms, 100);
        assert_eq!(config.browser.viewport.width, 1024);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn full_config_round_trips() {
        let config: Config = serde_json::from_str(
            r#"{
                "moneyforward": {
                    "base_url": "https://ssnb.x.moneyforward.com",
                    "mail_address": "a@example.com",
                    "password": "secret"
                },
                "proxy": { "server": "proxy:8080", "username": "u", "password": "p" },
                "browser": {
                    "headless": false,
                    "executable": "/usr/bin/chromium-browser",
                    "args": ["--lang=ja"],
                    "slow_mo_ms": 250,
                    "viewport": { "width": 1280, "height": 1024 }
                },
                "data_dir": "/data"
            }"#,
        )
        .unwrap();
        assert_eq!(config.base_url(), "https://ssnb.x.moneyforward.com");
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.server, "proxy:8080");
        assert_eq!(proxy.username.as_deref(), Some("u"));
        assert!(!config.browser.headless);
        assert_eq!(config.browser.args, vec!["--lang=ja"]);
        assert_eq!(config.data_dir, PathBuf::from("/data"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{ "moneyforward": { "mail_address": "a@example.com" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn load_resolves_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{ "moneyforward": { "mail_address": "a@example.com", "password": "x" } }"#,
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.moneyforward.mail_address, "a@example.com");
    }
}
