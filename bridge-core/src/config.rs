use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub accounting: AccountingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Listener settings. Management endpoints and the proxy catch-all share it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upper bound on the full upstream round trip.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// Inbound bodies larger than this are rejected before forwarding.
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
    /// When false, `rate_limit` on a service is advisory only.
    #[serde(default)]
    pub enforce_rate_limit: bool,
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_secs: u64,
}

/// Route table storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding the route table. `None` keeps it in memory only.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Seed the sample services when the table starts empty.
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

/// Request log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConfig {
    /// In-memory bound; the oldest records are evicted first.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Optional JSON-lines mirror of every record.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Window used by `/stats` when the caller does not pick one.
    #[serde(default = "default_window")]
    pub default_window_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, no prometheus counters are updated on the hot path.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_listen_addr() -> String { "0.0.0.0:5001".into() }
fn default_upstream_timeout() -> u64 { 30 }
fn default_max_body() -> usize { 16 * 1024 * 1024 }
fn default_rate_window() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_max_records() -> usize { 100_000 }
fn default_window() -> u64 { 86_400 }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: default_upstream_timeout(),
            max_body_bytes: default_max_body(),
            enforce_rate_limit: false,
            rate_limit_window_secs: default_rate_window(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            seed_defaults: true,
        }
    }
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            log_file: None,
            default_window_secs: default_window(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl ProxyConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }
}

impl GatewayConfig {
    /// Load configuration from YAML file + env overrides.
    ///
    /// Env keys are prefixed `BRIDGE_` and nest with `__`, e.g.
    /// `BRIDGE_PROXY__UPSTREAM_TIMEOUT_SECS=5`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: GatewayConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("BRIDGE_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Effective configuration rendered back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_proxy_config_has_expected_values() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.upstream_timeout_secs, 30);
        assert_eq!(cfg.upstream_timeout(), Duration::from_secs(30));
        assert!(!cfg.enforce_rate_limit);
        assert_eq!(cfg.rate_limit_window_secs, 60);
    }

    #[test]
    fn default_store_is_memory_and_seeds() {
        let cfg = StoreConfig::default();
        assert!(cfg.state_file.is_none());
        assert!(cfg.seed_defaults);
    }

    #[test]
    fn default_accounting_window_is_one_day() {
        let cfg = AccountingConfig::default();
        assert_eq!(cfg.default_window_secs, 86_400);
        assert_eq!(cfg.max_records, 100_000);
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn rate_window_never_zero() {
        let cfg = ProxyConfig {
            rate_limit_window_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.rate_limit_window(), Duration::from_secs(1));
    }

    #[test]
    fn load_from_valid_yaml_overrides_defaults() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmpfile,
            "server:\n  listen_addr: \"127.0.0.1:8088\"\nproxy:\n  upstream_timeout_secs: 5\n"
        )
        .unwrap();
        let cfg = GatewayConfig::load(tmpfile.path()).unwrap();
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:8088");
        assert_eq!(cfg.proxy.upstream_timeout_secs, 5);
        assert_eq!(cfg.proxy.max_body_bytes, 16 * 1024 * 1024);
        assert!(cfg.observability.prometheus.enabled);
    }

    #[test]
    fn load_yaml_with_store_and_accounting() {
        let yaml = r#"
store:
  state_file: "/var/lib/bridge/services.json"
  seed_defaults: false
accounting:
  max_records: 10
  log_file: "/var/log/bridge/requests.jsonl"
observability:
  prometheus:
    enabled: false
"#;
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "{yaml}").unwrap();
        let cfg = GatewayConfig::load(tmpfile.path()).unwrap();
        assert_eq!(
            cfg.store.state_file.as_deref(),
            Some(Path::new("/var/lib/bridge/services.json"))
        );
        assert!(!cfg.store.seed_defaults);
        assert_eq!(cfg.accounting.max_records, 10);
        assert!(cfg.accounting.log_file.is_some());
        assert!(!cfg.observability.prometheus.enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatewayConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:5001");
        assert_eq!(cfg.accounting.default_window_secs, 86_400);
    }

    #[test]
    fn yaml_rendering_round_trips() {
        let cfg = GatewayConfig::default();
        let yaml = cfg.to_yaml().unwrap();
        assert!(yaml.contains("listen_addr"));
        let back: GatewayConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.server.listen_addr, cfg.server.listen_addr);
    }
}
