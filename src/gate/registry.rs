// Managed services and request routing.

use std::sync::Arc;
use std::time::Duration;

use super::Gate;
use crate::upstream::Upstream;

/// Everything the proxy path needs to know about one managed service.
pub struct ManagedService {
    pub gate: Arc<Gate>,
    pub upstream: Arc<dyn Upstream>,
    pub keep_alive: Duration,
    hosts: Vec<String>,
    path_prefix: Option<String>,
}

impl ManagedService {
    pub fn new(
        gate: Arc<Gate>,
        upstream: Arc<dyn Upstream>,
        keep_alive: Duration,
        hosts: Vec<String>,
        path_prefix: Option<String>,
    ) -> Self {
        Self {
            gate,
            upstream,
            keep_alive,
            hosts: hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
            path_prefix,
        }
    }

    pub fn name(&self) -> &str {
        self.gate.name()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    /// Scores how specifically this service matches a request; `None` when
    /// it does not match at all. Higher scores win.
    fn score(&self, host: Option<&str>, path: &str) -> Option<(bool, usize)> {
        let host_hit = match host {
            Some(host) if !self.hosts.is_empty() => {
                if !self.hosts.iter().any(|h| h == host) {
                    return None;
                }
                true
            }
            None if !self.hosts.is_empty() => return None,
            _ => false,
        };
        let prefix_len = match self.path_prefix.as_deref() {
            Some(prefix) if prefix_matches(prefix, path) => prefix.len(),
            Some(_) => return None,
            None => 0,
        };
        Some((host_hit, prefix_len))
    }
}

/// Immutable set of managed services built at startup.
pub struct Registry {
    services: Vec<Arc<ManagedService>>,
}

impl Registry {
    pub fn new(services: Vec<Arc<ManagedService>>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &[Arc<ManagedService>] {
        &self.services
    }

    pub fn get(&self, name: &str) -> Option<Arc<ManagedService>> {
        self.services.iter().find(|s| s.name() == name).cloned()
    }

    /// Picks the service for a request.
    ///
    /// A host match beats no host match, then the longest path prefix wins.
    /// A service without hosts and prefix catches whatever is left.
    pub fn route(&self, host: Option<&str>, path: &str) -> Option<Arc<ManagedService>> {
        let host = host.map(normalize_host);
        let host = host.as_deref().filter(|h| !h.is_empty());

        self.services
            .iter()
            .filter_map(|s| s.score(host, path).map(|score| (score, s)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, s)| s.clone())
    }
}

/// Lowercases a Host header value and strips its port.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    without_port.to_ascii_lowercase()
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix.ends_with('/') || path.len() == prefix.len() || path[prefix.len()..].starts_with('/')
}
