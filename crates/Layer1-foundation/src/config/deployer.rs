//! Deployer configuration
//!
//! The configuration an engine hands to the connector factory. Field names
//! follow the engine's JSON shape: `camelCase` for the `podman` section and
//! the docker-style PascalCase for `deployment.container` / `deployment.host`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{CgroupNamespace, NetworkMode};

/// Binary looked up on `PATH` when no path is configured
pub const DEFAULT_PODMAN_PATH: &str = "podman";

/// Prefix applied when `containerNamePrefix` is empty
pub const DEFAULT_CONTAINER_NAME_PREFIX: &str = "poddeploy";

/// Seconds `podman stop` waits before killing
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Seconds to wait for a container to report as started
pub const DEFAULT_ATTACH_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Top level
// ============================================================================

/// Complete deployer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployerConfig {
    #[serde(default)]
    pub podman: PodmanConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl DeployerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from the engine's JSON representation
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a file, picking the format from the extension (`.toml` or JSON)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let parsed = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        let config = parsed
            .map_err(|e| Error::Config(format!("Invalid config at {}: {}", path.display(), e)))?;

        debug!(
            "Loaded deployer config from {}: prefix {:?}, {} env vars, {} binds",
            path.display(),
            config.podman.container_name_prefix,
            config.deployment.container.env.len(),
            config.deployment.host.binds.len()
        );

        Ok(config)
    }

    /// Syntactic validation. Semantics of passthrough values are left to the runtime.
    pub fn validate(&self) -> Result<()> {
        self.podman.validate()?;
        self.deployment.validate()
    }
}

// ============================================================================
// podman section
// ============================================================================

/// Runtime binary, naming and passthrough settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodmanConfig {
    /// Runtime binary; relative names are resolved through `PATH`
    #[serde(default = "default_path")]
    pub path: String,

    /// Container name prefix, `DEFAULT_CONTAINER_NAME_PREFIX` when empty
    #[serde(default)]
    pub container_name_prefix: String,

    /// Seed for the name generator; `0` derives one from the wall clock
    #[serde(default)]
    pub rng_seed: i64,

    #[serde(default)]
    pub cgroup_ns: String,

    #[serde(default)]
    pub network_mode: String,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,

    #[serde(default = "default_attach_timeout")]
    pub attach_timeout: u64,
}

fn default_path() -> String {
    DEFAULT_PODMAN_PATH.to_string()
}

fn default_stop_timeout() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}

fn default_attach_timeout() -> u64 {
    DEFAULT_ATTACH_TIMEOUT_SECS
}

impl Default for PodmanConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            container_name_prefix: String::new(),
            rng_seed: 0,
            cgroup_ns: String::new(),
            network_mode: String::new(),
            stop_timeout: DEFAULT_STOP_TIMEOUT_SECS,
            attach_timeout: DEFAULT_ATTACH_TIMEOUT_SECS,
        }
    }
}

impl PodmanConfig {
    /// Configured prefix, or the default one
    pub fn effective_prefix(&self) -> &str {
        if self.container_name_prefix.is_empty() {
            DEFAULT_CONTAINER_NAME_PREFIX
        } else {
            &self.container_name_prefix
        }
    }

    /// Parsed `cgroupNs`, `None` when unset
    pub fn cgroup_namespace(&self) -> Option<CgroupNamespace> {
        non_empty(&self.cgroup_ns).and_then(|s| s.parse().ok())
    }

    /// Parsed `networkMode`, `None` when unset
    pub fn network(&self) -> Option<NetworkMode> {
        non_empty(&self.network_mode).and_then(|s| s.parse().ok())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout)
    }

    fn validate(&self) -> Result<()> {
        let prefix_ok = self
            .container_name_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !prefix_ok {
            return Err(Error::Config(format!(
                "containerNamePrefix {:?} may only contain [A-Za-z0-9_.-]",
                self.container_name_prefix
            )));
        }
        if self.stop_timeout == 0 {
            return Err(Error::Config("stopTimeout must be at least 1 second".to_string()));
        }
        if self.attach_timeout == 0 {
            return Err(Error::Config(
                "attachTimeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

/// `None` for blank values; anything else is passed through untouched
fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

// ============================================================================
// deployment section
// ============================================================================

/// Container and host options applied to every deployed container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub container: ContainerOptions,

    #[serde(default)]
    pub host: HostOptions,
}

impl DeploymentConfig {
    fn validate(&self) -> Result<()> {
        for entry in &self.container.env {
            match entry.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(Error::Config(format!(
                        "Env entry {:?} must have the form KEY=VALUE",
                        entry
                    )))
                }
            }
        }

        for bind in &self.host.binds {
            let mut parts = bind.splitn(3, ':');
            let source = parts.next().unwrap_or_default();
            let target = parts.next().unwrap_or_default();
            if source.is_empty() || target.is_empty() {
                return Err(Error::Config(format!(
                    "Bind {:?} must have the form SOURCE:TARGET[:OPTIONS]",
                    bind
                )));
            }
        }

        Ok(())
    }
}

/// Container-create options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerOptions {
    /// `KEY=VALUE` entries
    #[serde(default)]
    pub env: Vec<String>,

    /// Loopback-only networking unless `networkMode` says otherwise
    #[serde(default)]
    pub network_disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Command override passed after the image
    #[serde(default)]
    pub cmd: Vec<String>,
}

/// Host-config options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostOptions {
    /// `SOURCE:TARGET[:OPTIONS]` bind mounts
    #[serde(default)]
    pub binds: Vec<String>,

    #[serde(default)]
    pub cap_add: Vec<String>,

    #[serde(default)]
    pub cap_drop: Vec<String>,

    #[serde(default)]
    pub security_opt: Vec<String>,

    #[serde(default)]
    pub readonly_rootfs: bool,

    /// Memory limit in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,

    /// CPU quota in units of 10^-9 CPUs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nano_cpus: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_JSON: &str = r#"
    {
        "podman": {
            "path": "/usr/bin/podman",
            "containerNamePrefix": "test_1",
            "rngSeed": 42,
            "cgroupNs": "private",
            "networkMode": "none"
        },
        "deployment": {
            "container": {
                "NetworkDisabled": true,
                "Env": ["A=1", "B=2"]
            },
            "host": {
                "Binds": ["./tests/volume:/test"]
            }
        }
    }
    "#;

    #[test]
    fn test_parse_engine_json() {
        let config = DeployerConfig::from_json_str(FULL_JSON).unwrap();
        assert_eq!(config.podman.path, "/usr/bin/podman");
        assert_eq!(config.podman.effective_prefix(), "test_1");
        assert_eq!(config.podman.rng_seed, 42);
        assert_eq!(config.podman.cgroup_namespace(), Some(CgroupNamespace::Private));
        assert_eq!(config.podman.network(), Some(NetworkMode::None));
        assert!(config.deployment.container.network_disabled);
        assert_eq!(config.deployment.container.env, vec!["A=1", "B=2"]);
        assert_eq!(config.deployment.host.binds, vec!["./tests/volume:/test"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = DeployerConfig::from_json_str("{}").unwrap();
        assert_eq!(config.podman.path, DEFAULT_PODMAN_PATH);
        assert_eq!(config.podman.effective_prefix(), DEFAULT_CONTAINER_NAME_PREFIX);
        assert_eq!(config.podman.rng_seed, 0);
        assert_eq!(config.podman.cgroup_namespace(), None);
        assert_eq!(config.podman.network(), None);
        assert_eq!(
            config.podman.stop_timeout(),
            Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS)
        );
        assert_eq!(config, DeployerConfig::default());
    }

    #[test]
    fn test_passthrough_values_are_not_trimmed() {
        let mut config = DeployerConfig::new();
        config.podman.cgroup_ns = " private ".to_string();
        config.podman.network_mode = "host ".to_string();
        assert_eq!(
            config.podman.cgroup_namespace().map(|ns| ns.to_string()),
            Some(" private ".to_string())
        );
        assert_eq!(
            config.podman.network().map(|n| n.to_string()),
            Some("host ".to_string())
        );

        config.podman.cgroup_ns = "   ".to_string();
        assert_eq!(config.podman.cgroup_namespace(), None);
    }

    #[test]
    fn test_negative_seed_is_accepted() {
        let config = DeployerConfig::from_json_str(r#"{"podman": {"rngSeed": -5}}"#).unwrap();
        assert_eq!(config.podman.rng_seed, -5);
        assert!(config.validate().is_ok());

        let config = DeployerConfig::from_toml_str("[podman]\nrngSeed = -42").unwrap();
        assert_eq!(config.podman.rng_seed, -42);
    }

    #[test]
    fn test_validation_rejects_bad_entries() {
        let mut config = DeployerConfig::new();
        config.deployment.container.env = vec!["=nokey".to_string()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = DeployerConfig::new();
        config.deployment.host.binds = vec!["/only-source".to_string()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = DeployerConfig::new();
        config.podman.container_name_prefix = "bad prefix".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = DeployerConfig::new();
        config.podman.stop_timeout = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_toml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("deployer.toml");
        let mut file = std::fs::File::create(&toml_path).unwrap();
        writeln!(
            file,
            "[podman]\ncontainerNamePrefix = \"from_toml\"\nnetworkMode = \"host\"\n\n[deployment.host]\nBinds = [\"/a:/b:ro\"]"
        )
        .unwrap();
        let config = DeployerConfig::load(&toml_path).unwrap();
        assert_eq!(config.podman.effective_prefix(), "from_toml");
        assert_eq!(config.podman.network(), Some(NetworkMode::Host));
        assert_eq!(config.deployment.host.binds, vec!["/a:/b:ro"]);

        let json_path = dir.path().join("deployer.json");
        std::fs::write(&json_path, FULL_JSON).unwrap();
        let config = DeployerConfig::load(&json_path).unwrap();
        assert_eq!(config.podman.effective_prefix(), "test_1");

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            DeployerConfig::load(&broken),
            Err(Error::Config(_))
        ));
    }
}
