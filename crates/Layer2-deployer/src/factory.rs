//! Connector factory
//!
//! Resolves the runtime binary and builds a connector. Every failure here is
//! an `Error::Config` and happens before any container exists.

use crate::connector::Connector;
use crate::driver::{PodmanCli, RuntimeDriver};
use poddeploy_foundation::{DeployerConfig, Error, Result, DEFAULT_PODMAN_PATH};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Builds podman connectors
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectorFactory;

impl ConnectorFactory {
    pub fn new() -> Self {
        Self
    }

    /// Deployer identifier
    pub fn id(&self) -> &'static str {
        "podman"
    }

    /// Validate the config, resolve the binary and build a connector
    pub fn create(&self, config: DeployerConfig) -> Result<Connector> {
        config.validate()?;
        let binary = resolve_binary(&config.podman.path)?;

        info!("Using container runtime at {}", binary.display());
        let driver = PodmanCli::new(binary).with_attach_timeout(config.podman.attach_timeout());
        Ok(Connector::new(Arc::new(driver), config))
    }

    /// Like `create`, but also runs `--version` to make sure the binary works
    pub async fn create_checked(&self, config: DeployerConfig) -> Result<Connector> {
        let connector = self.create(config)?;
        let version = connector
            .driver()
            .version()
            .await
            .map_err(|e| Error::Config(format!("container runtime is not usable: {}", e)))?;
        info!("Container runtime reports {}", version);
        Ok(connector)
    }
}

/// Resolve the configured runtime binary. Relative names go through `PATH`.
pub fn resolve_binary(path: &str) -> Result<PathBuf> {
    let path = match path.trim() {
        "" => DEFAULT_PODMAN_PATH,
        path => path,
    };

    let candidate = Path::new(path);
    let resolved = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        which::which(path).map_err(|e| {
            Error::Config(format!(
                "podman executable {:?} not found in a valid path: {}",
                path, e
            ))
        })?
    };

    let metadata = std::fs::metadata(&resolved).map_err(|e| {
        Error::Config(format!(
            "podman binary {} not found: {}",
            resolved.display(),
            e
        ))
    })?;
    if !metadata.is_file() {
        return Err(Error::Config(format!(
            "podman binary {} is not a file",
            resolved.display()
        )));
    }

    Ok(resolved)
}
