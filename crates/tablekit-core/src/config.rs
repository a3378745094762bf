//! Application configuration management.
//!
//! Two kinds of configuration live here:
//! - `ApiSettings`: where the backend API is, resolved from environment
//!   variables and `.env` files the same way the web build resolves it
//! - `Config`: preferences persisted at `~/.config/tablekit/config.json`
//!
//! The durable session storage lives in the cache directory,
//! `~/.cache/tablekit` on Linux.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tablekit";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Relative API path served through the reverse proxy
const DEFAULT_API_PATH: &str = "/api";

/// Backend address used by the development proxy
const LOCAL_BACKEND: &str = "http://localhost:5000";

const DEFAULT_BACKEND_PORT: &str = "5000";

// ============================================================================
// API endpoint resolution
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeployMode {
    #[default]
    Local,
    Cloud,
}

impl DeployMode {
    /// Anything other than `cloud` (case-insensitive) means local
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("cloud") {
            DeployMode::Cloud
        } else {
            DeployMode::Local
        }
    }
}

/// Inputs for locating the backend API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    /// Explicit override (`VITE_API_URL`)
    pub api_url: Option<String>,
    /// `DEPLOY_MODE`
    pub deploy_mode: DeployMode,
    /// `PUBLIC_DOMAIN`, served over HTTPS
    pub public_domain: Option<String>,
    /// `PUBLIC_IP`, served over plain HTTP on `port`
    pub public_ip: Option<String>,
    /// `PORT`, backend port for IP deployments
    pub port: Option<String>,
    /// `TABLEKIT_DEV`: talk to the local backend through the dev proxy
    pub dev: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ApiSettings {
    /// Build settings from any variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let dev = non_empty(lookup("TABLEKIT_DEV"))
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            api_url: non_empty(lookup("VITE_API_URL")),
            deploy_mode: lookup("DEPLOY_MODE")
                .map(|m| DeployMode::parse(&m))
                .unwrap_or_default(),
            public_domain: non_empty(lookup("PUBLIC_DOMAIN")),
            public_ip: non_empty(lookup("PUBLIC_IP")),
            port: non_empty(lookup("PORT")),
            dev,
        }
    }

    /// Build settings from the process environment plus `.env` files in the
    /// working directory and its parent.
    ///
    /// Process variables win; between the two files the parent's wins.
    pub fn from_env() -> Self {
        let mut vars = HashMap::new();
        if let Ok(cwd) = std::env::current_dir() {
            merge_env_file(&mut vars, &cwd.join(".env"));
            if let Some(parent) = cwd.parent() {
                merge_env_file(&mut vars, &parent.join(".env"));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| vars.get(key).cloned()))
    }

    /// Apply an override unless one is already set
    pub fn with_fallback_url(mut self, api_url: Option<String>) -> Self {
        if self.api_url.is_none() {
            self.api_url = non_empty(api_url);
        }
        self
    }

    /// The API URL as the web build would publish it: the explicit override,
    /// a cloud address, or the relative `/api` default.
    pub fn resolve_api_url(&self) -> String {
        if let Some(ref url) = self.api_url {
            return url.clone();
        }

        if self.deploy_mode == DeployMode::Cloud {
            if let Some(ref domain) = self.public_domain {
                return format!("https://{}/api", domain);
            }
            if let Some(ref ip) = self.public_ip {
                let port = self.port.as_deref().unwrap_or(DEFAULT_BACKEND_PORT);
                return format!("http://{}:{}/api", ip, port);
            }
        }

        DEFAULT_API_PATH.to_string()
    }

    /// Origin the reverse proxy forwards `/api` requests to.
    ///
    /// In dev mode this is always the local backend, whatever the resolved
    /// URL says.
    pub fn proxy_target(&self) -> String {
        if self.dev {
            return LOCAL_BACKEND.to_string();
        }
        let resolved = self.resolve_api_url();
        let trimmed = resolved.trim_end_matches('/');
        let target = trimmed.strip_suffix(DEFAULT_API_PATH).unwrap_or(trimmed);
        if is_absolute(target) {
            target.to_string()
        } else {
            LOCAL_BACKEND.to_string()
        }
    }

    /// Absolute base URL requests are sent to
    pub fn base_url(&self) -> String {
        if self.dev {
            return format!("{}{}", LOCAL_BACKEND, DEFAULT_API_PATH);
        }
        let resolved = self.resolve_api_url();
        if is_absolute(&resolved) {
            resolved
        } else {
            let path = if resolved.starts_with('/') {
                resolved
            } else {
                format!("/{}", resolved)
            };
            format!("{}{}", self.proxy_target(), path)
        }
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn merge_env_file(vars: &mut HashMap<String, String>, path: &Path) {
    if !path.exists() {
        return;
    }
    match dotenvy::from_path_iter(path) {
        Ok(iter) => {
            for item in iter {
                match item {
                    Ok((key, value)) => {
                        vars.insert(key, value);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping bad .env line"),
                }
            }
            debug!(path = %path.display(), "Loaded env file");
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to read env file"),
    }
}

// ============================================================================
// Persisted preferences
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub last_username: Option<String>,
    /// Used when no `VITE_API_URL` is set
    pub api_url: Option<String>,
}

impl Config {
    /// Load preferences from the default location; a missing file yields
    /// the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// `~/.config/tablekit/config.json` on Linux
    pub fn path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("No config directory on this platform")?;
        Ok(dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the session storage and log file live
    pub fn cache_dir() -> Result<PathBuf> {
        let dir = dirs::cache_dir().context("No cache directory on this platform")?;
        Ok(dir.join(APP_NAME))
    }
}
