//! Layered configuration: defaults, optional `config.toml`, then environment
//! variables prefixed `PROVENANCE__` (double underscore as the nesting
//! separator, e.g. `PROVENANCE__DISCOVERY__TCP_WORKERS=120`).

use serde::{Deserialize, Serialize};

fn default_data_dir() -> String {
    "testing/data".to_string()
}
fn default_tcp_workers() -> usize {
    60
}
fn default_icmp_workers() -> usize {
    80
}
fn default_max_hosts() -> usize {
    1024
}
fn default_tcp_timeout_ms() -> u64 {
    150
}
fn default_icmp_timeout_ms() -> u64 {
    1000
}
fn default_execute_timeout_s() -> u64 {
    60
}
fn default_phase2_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_tcp_workers")]
    pub tcp_workers: usize,
    #[serde(default = "default_icmp_workers")]
    pub icmp_workers: usize,
    #[serde(default = "default_max_hosts")]
    pub max_hosts: usize,
    #[serde(default = "default_tcp_timeout_ms")]
    pub tcp_timeout_ms: u64,
    #[serde(default = "default_icmp_timeout_ms")]
    pub icmp_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tcp_workers: default_tcp_workers(),
            icmp_workers: default_icmp_workers(),
            max_hosts: default_max_hosts(),
            tcp_timeout_ms: default_tcp_timeout_ms(),
            icmp_timeout_ms: default_icmp_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_execute_timeout_s")]
    pub execute_timeout_s: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            execute_timeout_s: default_execute_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase2Config {
    #[serde(default = "default_phase2_concurrency")]
    pub concurrency: usize,
}

impl Default for Phase2Config {
    fn default() -> Self {
        Self {
            concurrency: default_phase2_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Neo4jConfig {
    /// The push stage is disabled unless all three fields are present.
    pub fn is_enabled(&self) -> bool {
        self.uri.is_some() && self.user.is_some() && self.password.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub phase2: Phase2Config,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
}

impl ScannerConfig {
    /// Builds the layered configuration: built-in defaults, then
    /// `./config.toml` if present, then `PROVENANCE__`-prefixed environment
    /// variables.
    pub fn load() -> Result<Self, crate::error::ProvenanceError> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("PROVENANCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::ProvenanceError::Config(e.to_string()))?;

        raw.try_deserialize()
            .map_err(|e| crate::error::ProvenanceError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ScannerConfig::default();
        assert_eq!(cfg.discovery.tcp_workers, 60);
        assert_eq!(cfg.discovery.icmp_workers, 80);
        assert_eq!(cfg.discovery.max_hosts, 1024);
        assert_eq!(cfg.discovery.tcp_timeout_ms, 150);
        assert_eq!(cfg.discovery.icmp_timeout_ms, 1000);
        assert_eq!(cfg.transport.execute_timeout_s, 60);
        assert_eq!(cfg.phase2.concurrency, 1);
        assert!(!cfg.neo4j.is_enabled());
    }
}
