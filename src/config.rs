use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "tweet-sync";
const BASE_URL_ENV: &str = "TWEET_SYNC_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub draft: DraftConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,
    #[serde(default = "default_csrf_header")]
    pub csrf_header: String,
    /// Session cookies (`name=value`) seeded into the cookie jar.
    #[serde(default)]
    pub cookies: Vec<String>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            csrf_cookie: default_csrf_cookie(),
            csrf_header: default_csrf_header(),
            cookies: Vec::new(),
            request_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_csrf_cookie() -> String {
    "csrftoken".into()
}

fn default_csrf_header() -> String {
    "X-CSRFToken".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_refresh_interval_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftConfig {
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: default_autosave_interval_ms(),
        }
    }
}

impl DraftConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

fn default_autosave_interval_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_draft_ttl_ms")]
    pub draft_ttl_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            draft_ttl_ms: default_draft_ttl_ms(),
        }
    }
}

impl NotificationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn draft_ttl(&self) -> Duration {
        Duration::from_millis(self.draft_ttl_ms)
    }
}

fn default_ttl_ms() -> u64 {
    3_000
}

fn default_draft_ttl_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ThemeConfig {
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl ThemeConfig {
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store_path
            .clone()
            .or_else(|| app_dir().map(|dir| dir.join("theme")))
    }
}

/// Directory holding the config file and the persisted theme.
pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

pub fn default_config_path() -> Option<PathBuf> {
    app_dir().map(|dir| dir.join("config.toml"))
}

/// Loads the config file (explicit path, else the default location when it
/// exists) and applies environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut cfg = match path {
        Some(path) => read_config_file(path)?,
        None => match default_config_path() {
            Some(default_path) if default_path.exists() => read_config_file(&default_path)?,
            _ => Config::default(),
        },
    };

    if let Ok(base_url) = env::var(BASE_URL_ENV) {
        if !base_url.trim().is_empty() {
            cfg.server.base_url = base_url.trim().to_string();
        }
    }

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    parse(&data).with_context(|| format!("Failed to parse config file at {}", path.display()))
}

pub fn parse(data: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(data)?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Timer periods must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.refresh.interval_ms == 0 {
            bail!("refresh.interval_ms must be greater than zero");
        }
        if self.draft.autosave_interval_ms == 0 {
            bail!("draft.autosave_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.refresh.interval(), Duration::from_secs(10));
        assert_eq!(cfg.draft.autosave_interval(), Duration::from_secs(30));
        assert_eq!(cfg.notifications.ttl(), Duration::from_secs(3));
        assert_eq!(cfg.notifications.draft_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.server.csrf_cookie, "csrftoken");
        assert_eq!(cfg.server.request_timeout(), None);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let cfg = parse(
            r#"
[server]
base_url = "https://chirp.example"
cookies = ["sessionid=abc"]

[refresh]
interval_ms = 2500
"#,
        )
        .unwrap();
        assert_eq!(cfg.server.base_url, "https://chirp.example");
        assert_eq!(cfg.server.cookies, vec!["sessionid=abc".to_string()]);
        assert_eq!(cfg.server.csrf_header, "X-CSRFToken");
        assert_eq!(cfg.refresh.interval(), Duration::from_millis(2500));
        assert_eq!(cfg.draft.autosave_interval_ms, 30_000);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(parse("[refresh]\ninterval_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let err = parse("[refresh]\ninterval_ms = 0").unwrap_err();
        assert!(err.to_string().contains("refresh.interval_ms"));
        let err = parse("[draft]\nautosave_interval_ms = 0").unwrap_err();
        assert!(err.to_string().contains("draft.autosave_interval_ms"));
        assert!(parse("[refresh]\ninterval_ms = 1").is_ok());
    }

    #[test]
    fn test_load_rejects_zero_interval_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[refresh]\ninterval_ms = 0\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[theme]\nstore_path = \"/tmp/theme\"\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.theme.store_path(), Some(PathBuf::from("/tmp/theme")));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
