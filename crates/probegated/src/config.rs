//! probegated.toml configuration parser.
//!
//! ```toml
//! [mutex]
//! backoff_sequence_secs = [2.0, 5.0, 10.0]
//! jitter_pct = 0.2
//! lock_timeout_secs = 60.0
//!
//! [runner]
//! samples = 3
//! interval_secs = 30.0
//!
//! [server]
//! listen = "127.0.0.1:9095"
//!
//! [[targets]]
//! url = "http://127.0.0.1:8080/healthz"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use probegate_mutex::{MutexConfig, ProbeTarget};
use probegate_runner::RunnerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbedConfig {
    #[serde(default)]
    pub mutex: MutexConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9095".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,
}

/// A config with every field validated and every target parsed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mutex: MutexConfig,
    pub runner: RunnerConfig,
    pub listen: SocketAddr,
    pub targets: Vec<ProbeTarget>,
}

impl ProbedConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate everything and parse targets. Two entries that normalize
    /// to the same target are rejected.
    pub fn resolve(self) -> anyhow::Result<Settings> {
        let mutex = self.mutex.validate().context("invalid [mutex] config")?;
        let runner = self.runner.validate().context("invalid [runner] config")?;
        let listen: SocketAddr = self
            .server
            .listen
            .parse()
            .with_context(|| format!("invalid [server] listen address `{}`", self.server.listen))?;

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for entry in &self.targets {
            let target = ProbeTarget::parse(&entry.url)
                .with_context(|| format!("invalid target `{}`", entry.url))?;
            if !seen.insert(target.key().clone()) {
                bail!("duplicate target `{}` (normalizes to {})", entry.url, target);
            }
            targets.push(target);
        }

        Ok(Settings {
            mutex,
            runner,
            listen,
            targets,
        })
    }

    /// Scaffold a config probing a single local endpoint.
    pub fn scaffold(url: &str) -> Self {
        Self {
            targets: vec![TargetConfig {
                url: url.to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parse_minimal() {
        let settings = ProbedConfig::from_toml(
            r#"
[[targets]]
url = "http://127.0.0.1:8080/healthz"
"#,
        )
        .unwrap()
        .resolve()
        .unwrap();

        assert_eq!(settings.targets.len(), 1);
        assert_eq!(settings.targets[0].address(), "127.0.0.1:8080");
        assert_eq!(settings.mutex, MutexConfig::default());
        assert_eq!(settings.runner, RunnerConfig::default());
        assert_eq!(settings.listen, "127.0.0.1:9095".parse().unwrap());
    }

    #[test]
    fn parse_full() {
        let settings = ProbedConfig::from_toml(
            r#"
[mutex]
backoff_sequence_secs = [1.0, 3.0]
jitter_pct = 0.1
lock_timeout_secs = 30.0

[runner]
samples = 5
interval_secs = 10.0
contention_retries = 2

[server]
listen = "0.0.0.0:9000"

[[targets]]
url = "http://a/health"

[[targets]]
url = "http://b/health"
"#,
        )
        .unwrap()
        .resolve()
        .unwrap();

        assert_eq!(settings.mutex.lock_timeout(), Duration::from_secs(30));
        assert_eq!(settings.mutex.backoff_sequence_secs, vec![1.0, 3.0]);
        assert_eq!(settings.runner.samples, 5);
        assert_eq!(settings.runner.contention_retries, 2);
        assert_eq!(settings.runner.timeout_secs, 5.0);
        assert_eq!(settings.listen.port(), 9000);
        assert_eq!(settings.targets.len(), 2);
    }

    #[test]
    fn rejects_duplicate_targets() {
        let err = ProbedConfig::from_toml(
            r#"
[[targets]]
url = "http://a/health"

[[targets]]
url = "HTTP://A/health#x"
"#,
        )
        .unwrap()
        .resolve()
        .unwrap_err();
        assert!(err.to_string().contains("duplicate target"));
    }

    #[test]
    fn rejects_invalid_sections() {
        let bad_jitter = ProbedConfig::from_toml("[mutex]\njitter_pct = 2.0\n")
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(bad_jitter.to_string().contains("[mutex]"));

        let bad_url = ProbedConfig::from_toml("[[targets]]\nurl = \"ftp://x\"\n")
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(bad_url.to_string().contains("invalid target"));

        let bad_listen = ProbedConfig::from_toml("[server]\nlisten = \"nowhere\"\n")
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(bad_listen.to_string().contains("listen"));
    }

    #[test]
    fn from_file_roundtrips_scaffold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probegated.toml");
        let scaffold = ProbedConfig::scaffold("http://127.0.0.1:8080/healthz");
        std::fs::write(&path, scaffold.to_toml_string().unwrap()).unwrap();

        let settings = ProbedConfig::from_file(&path).unwrap().resolve().unwrap();
        assert_eq!(settings.targets[0].url(), "http://127.0.0.1:8080/healthz");
    }

    #[test]
    fn from_file_missing_reports_path() {
        let err = ProbedConfig::from_file(Path::new("/nonexistent/probegated.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/probegated.toml"));
    }
}
