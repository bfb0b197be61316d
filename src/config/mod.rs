// Configuration loading and validation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::orchestrator::{Endpoint, ScaleError};

pub const PROD: &str = "prod";
pub const TEST: &str = "test";

/// Shortest keep-alive accepted for a managed service.
pub const MIN_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SCALE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub gate: ConfigBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigBox {
    #[serde(default)]
    pub env: String,
    pub logs: Option<Logs>,
    pub api: Option<Api>,
    pub orchestrator: Option<Orchestrator>,
    pub k8s: Option<K8S>,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    pub name: Option<String>,
    pub port: Option<String>,
}

/// Orchestrator connection settings shared by all services.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Orchestrator {
    pub endpoint: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default, rename = "poll_interval", with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Probe {
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct K8S {
    pub probe: Probe,
}

/// One managed service: what to scale, for how long to keep it, where to forward.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Service {
    #[serde(default, rename = "service_name")]
    pub service_name: String,
    #[serde(default, rename = "keep_alive", with = "humantime_serde")]
    pub keep_alive: Option<Duration>,
    #[serde(default, rename = "scale_timeout", with = "humantime_serde")]
    pub scale_timeout: Option<Duration>,
    #[serde(rename = "orchestrator_endpoint")]
    pub orchestrator_endpoint: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(rename = "path_prefix")]
    pub path_prefix: Option<String>,
    pub backend: Option<Backend>,
}

impl Service {
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE)
    }

    pub fn scale_timeout(&self) -> Duration {
        self.scale_timeout.unwrap_or(DEFAULT_SCALE_TIMEOUT)
    }

    fn validate(&mut self) -> Result<(), ScaleError> {
        self.service_name = self.service_name.trim().to_string();
        if self.service_name.is_empty() {
            return Err(ScaleError::Config("service_name is required".to_string()));
        }
        let name = &self.service_name;

        let keep_alive = *self.keep_alive.get_or_insert(DEFAULT_KEEP_ALIVE);
        if keep_alive < MIN_KEEP_ALIVE {
            return Err(ScaleError::Config(format!(
                "{name}: keep_alive must be at least {}, got {}",
                humantime::format_duration(MIN_KEEP_ALIVE),
                humantime::format_duration(keep_alive)
            )));
        }
        if self.scale_timeout.get_or_insert(DEFAULT_SCALE_TIMEOUT).is_zero() {
            return Err(ScaleError::Config(format!("{name}: scale_timeout must be positive")));
        }
        if let Some(endpoint) = &self.orchestrator_endpoint {
            Endpoint::parse(endpoint)?;
        }

        self.hosts = self
            .hosts
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        if let Some(prefix) = &self.path_prefix {
            if !prefix.starts_with('/') {
                return Err(ScaleError::Config(format!(
                    "{name}: path_prefix must start with '/', got {prefix:?}"
                )));
            }
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| ScaleError::Config(format!("{name}: backend is required")))?;
        if backend.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(ScaleError::Config(format!("{name}: backend.host is required")));
        }
        let scheme = backend.scheme.get_or_insert_with(|| "http".to_string()).clone();
        if scheme != "http" && scheme != "https" {
            return Err(ScaleError::Config(format!(
                "{name}: unsupported backend scheme {scheme:?}"
            )));
        }
        let host = backend.host.as_deref().unwrap_or_default().trim();
        match url::Url::parse(&format!("{scheme}://{host}")) {
            Ok(url) if url.path() == "/" && url.query().is_none() => Ok(()),
            _ => Err(ScaleError::Config(format!(
                "{name}: backend.host must be host[:port], got {host:?}"
            ))),
        }
    }
}

/// Where requests of a managed service are forwarded to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Backend {
    pub scheme: Option<String>,
    pub host: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn api(&self) -> Option<&Api>;
    fn orchestrator(&self) -> Option<&Orchestrator>;
    fn k8s(&self) -> Option<&K8S>;
    fn services(&self) -> &[Service];
}

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.gate.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.gate.env == PROD
    }

    fn is_test(&self) -> bool {
        self.gate.env == TEST
    }

    fn api(&self) -> Option<&Api> {
        self.gate.api.as_ref()
    }

    fn orchestrator(&self) -> Option<&Orchestrator> {
        self.gate.orchestrator.as_ref()
    }

    fn k8s(&self) -> Option<&K8S> {
        self.gate.k8s.as_ref()
    }

    fn services(&self) -> &[Service] {
        &self.gate.services
    }
}

impl Config {
    /// Loads and validates configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::from_yaml(&data).with_context(|| format!("load config from {:?}", abs_path))
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut cfg: Config = serde_yaml::from_str(data).context("unmarshal yaml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies defaults and checks every constraint that would otherwise
    /// surface only on the first request.
    pub fn validate(&mut self) -> Result<(), ScaleError> {
        if let Some(endpoint) = self.orchestrator().and_then(|o| o.endpoint.as_deref()) {
            Endpoint::parse(endpoint)?;
        }
        if self.gate.services.is_empty() {
            return Err(ScaleError::Config("at least one service is required".to_string()));
        }

        let mut names = HashSet::new();
        for service in self.gate.services.iter_mut() {
            service.validate()?;
            if !names.insert(service.service_name.clone()) {
                return Err(ScaleError::Config(format!(
                    "service {} is configured more than once",
                    service.service_name
                )));
            }
        }

        let catch_all = self
            .gate
            .services
            .iter()
            .filter(|s| s.hosts.is_empty() && s.path_prefix.is_none())
            .count();
        if catch_all > 1 {
            return Err(ScaleError::Config(
                "only one service may omit both hosts and path_prefix".to_string(),
            ));
        }
        Ok(())
    }
}

// Test config is always available for integration tests
mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;
