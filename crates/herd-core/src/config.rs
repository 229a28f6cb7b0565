//! herd.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HerdConfig {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub platform: PlatformConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard cap on pool membership, enforced at scale-up.
    pub worker_cap: usize,
    /// Workers scaled up when the daemon starts.
    pub initial_workers: usize,
    /// How long dispatch and scale-down wait for an idle worker.
    /// Unset means wait indefinitely.
    pub acquire_timeout: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_cap: 10,
            initial_workers: 0,
            acquire_timeout: None,
        }
    }
}

/// Which platform backend provisions workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// In-process workers; dispatch answers with a canned acknowledgement.
    #[default]
    Mock,
    /// A fixed roster of pre-existing hosts.
    Static,
}

impl std::str::FromStr for PlatformKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mock" => Ok(PlatformKind::Mock),
            "static" => Ok(PlatformKind::Static),
            other => Err(ConfigError::Invalid(format!("unknown platform: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
    /// Host addresses available to the static platform.
    pub hosts: Vec<String>,
    pub readiness_path: String,
    pub readiness_timeout: String,
    pub probe_interval: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            kind: PlatformKind::Mock,
            hosts: Vec::new(),
            readiness_path: "/healthz".to_string(),
            readiness_timeout: "30s".to_string(),
            probe_interval: "500ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Port every worker serves requests on.
    pub worker_port: u16,
    pub connect_timeout: String,
    pub request_timeout: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            worker_port: 5000,
            connect_timeout: "5s".to_string(),
            request_timeout: None,
        }
    }
}

impl HerdConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: HerdConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.worker_cap == 0 {
            return Err(ConfigError::Invalid("pool.worker_cap must be at least 1".into()));
        }
        if self.pool.initial_workers > self.pool.worker_cap {
            return Err(ConfigError::Invalid(format!(
                "pool.initial_workers ({}) exceeds pool.worker_cap ({})",
                self.pool.initial_workers, self.pool.worker_cap
            )));
        }
        if self.platform.kind == PlatformKind::Static && self.platform.hosts.is_empty() {
            return Err(ConfigError::Invalid(
                "static platform requires at least one entry in platform.hosts".into(),
            ));
        }
        duration_field("platform.readiness_timeout", &self.platform.readiness_timeout)?;
        duration_field("platform.probe_interval", &self.platform.probe_interval)?;
        duration_field("proxy.connect_timeout", &self.proxy.connect_timeout)?;
        if let Some(t) = &self.pool.acquire_timeout {
            duration_field("pool.acquire_timeout", t)?;
        }
        if let Some(t) = &self.proxy.request_timeout {
            duration_field("proxy.request_timeout", t)?;
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.pool.acquire_timeout.as_deref().and_then(parse_duration)
    }

    pub fn readiness_timeout(&self) -> Duration {
        parse_duration(&self.platform.readiness_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn probe_interval(&self) -> Duration {
        parse_duration(&self.platform.probe_interval).unwrap_or(Duration::from_millis(500))
    }

    pub fn connect_timeout(&self) -> Duration {
        parse_duration(&self.proxy.connect_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.proxy.request_timeout.as_deref().and_then(parse_duration)
    }
}

fn duration_field(name: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{name}: invalid duration {value:?}")))
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
