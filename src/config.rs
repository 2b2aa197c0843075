// Service configuration.
// Loads the TOML config file, applies command line and environment overrides, and validates.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "API_CACHE_CONFIG";
/// Environment variable carrying the upstream API token.
pub const TOKEN_ENV: &str = "GITHUB_API_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Organization whose info, members and repos are cached.
    #[serde(default = "default_org")]
    pub org: String,
    /// Sent as a bearer token on refresh requests when set.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            org: default_org(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on a single route's refresh within one cycle.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_org() -> String {
    "Netflix".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    2
}

fn default_interval_secs() -> u64 {
    5 * 60
}

fn default_cycle_timeout_secs() -> u64 {
    4 * 60
}

impl AppConfig {
    /// Load configuration from the resolved file (if any), then apply process overrides.
    ///
    /// The first command line argument, when present, is the listen port.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match resolve_config_path(std::env::var_os(CONFIG_ENV), project_config_path())
        {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        let port = std::env::args().nth(1);
        let token = std::env::var(TOKEN_ENV).ok();
        cfg.apply_overrides(port.as_deref(), token)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let path = path.to_path_buf();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        toml::from_str::<AppConfig>(&raw)
            .map_err(|source| ConfigError::ParseFailed { path, source })
    }

    /// Apply the port argument and token environment value on top of the file config.
    pub fn apply_overrides(
        &mut self,
        port: Option<&str>,
        token: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = port {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid port on command line: {port}")))?;
            let host = self
                .server
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.listen_addr = format!("{host}:{port}");
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.upstream.api_token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.org.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.org must not be empty".into()));
        }
        let base = self.upstream.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "upstream.base_url must be an http(s) URL, got '{base}'"
            )));
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh.interval_secs must be > 0".into()));
        }
        if self.refresh.cycle_timeout_secs == 0 || self.upstream.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".into()));
        }
        Ok(())
    }
}

fn project_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "api-cache").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// An explicit path always wins; the per-user file is used only if it exists.
fn resolve_config_path(explicit: Option<OsString>, project: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    project.filter(|path| path.exists())
}
