//! Connector - turns a deploy request into a running, attached container
//!
//! One connector owns the name generator and the resolved deployment
//! options. Deploys on the same connector only contend on the generator
//! lock; everything else runs concurrently.

use crate::driver::cli::short_id;
use crate::driver::{InvocationSpec, RuntimeDriver};
use crate::handle::ContainerHandle;
use crate::naming::NameGenerator;
use poddeploy_foundation::{DeployerConfig, DeploymentConfig, Error, PodmanConfig, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Deploys images as podman containers
pub struct Connector {
    driver: Arc<dyn RuntimeDriver>,
    names: NameGenerator,
    podman: PodmanConfig,
    deployment: DeploymentConfig,
}

impl Connector {
    /// Build a connector over any driver. `ConnectorFactory::create` is the
    /// checked entry point for the podman CLI.
    pub fn new(driver: Arc<dyn RuntimeDriver>, config: DeployerConfig) -> Self {
        let names = NameGenerator::new(config.podman.effective_prefix(), config.podman.rng_seed);
        debug!(
            "Connector ready: driver {}, prefix {}, seed {}",
            driver.name(),
            names.prefix(),
            names.seed()
        );

        Self {
            driver,
            names,
            podman: config.podman,
            deployment: config.deployment,
        }
    }

    /// Container name prefix
    pub fn prefix(&self) -> &str {
        self.names.prefix()
    }

    /// Seed of the name generator
    pub fn seed(&self) -> i64 {
        self.names.seed()
    }

    pub fn driver(&self) -> Arc<dyn RuntimeDriver> {
        Arc::clone(&self.driver)
    }

    /// Deploy `image` and return its attached handle.
    ///
    /// Cancellation before anything is spawned returns `Error::Cancelled`
    /// with no side effects. Once the runtime has been invoked, cancellation
    /// removes whatever was created on a best-effort basis.
    pub async fn deploy(&self, cancel: &CancellationToken, image: &str) -> Result<ContainerHandle> {
        let image = image.trim();
        if image.is_empty() {
            return Err(Error::InvalidInput(
                "image reference must not be empty".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let name = self.names.next_name();
        let spec = InvocationSpec::resolve(&self.podman, &self.deployment, &name, image);
        info!("Deploying {} as {}", image, name);

        // Create
        let id = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Deploy of {} cancelled during create", name);
                self.discard(&name).await;
                return Err(Error::Cancelled);
            }
            created = self.driver.create(&spec) => match created {
                Ok(id) => id,
                Err(e) => {
                    error!("Failed to create {} from {}: {}", name, image, e);
                    return Err(Error::deploy(image, e));
                }
            },
        };

        // From here on the handle owns cleanup
        let mut handle = ContainerHandle::created(
            &id,
            &name,
            Arc::clone(&self.driver),
            self.podman.stop_timeout(),
        );

        // Start + attach
        let attached = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            attached = self.driver.attach(&id) => Some(attached),
        };

        match attached {
            Some(Ok(stream)) => handle.bind(stream),
            Some(Err(e)) => {
                error!("Failed to start {} ({}): {}", name, short_id(&id), e);
                if let Err(cleanup) = handle.close().await {
                    warn!("Cleanup after failed start of {}: {}", name, cleanup);
                }
                return Err(Error::deploy(image, e));
            }
            None => {
                warn!("Deploy of {} cancelled during attach", name);
                if let Err(cleanup) = handle.close().await {
                    warn!("Cleanup after cancelled deploy of {}: {}", name, cleanup);
                }
                return Err(Error::Cancelled);
            }
        }

        info!("Deployed {} as {} ({})", image, name, short_id(&id));
        Ok(handle)
    }

    /// Best-effort removal of a container known only by name
    async fn discard(&self, name: &str) {
        if let Err(e) = self.driver.remove(name).await {
            warn!("Failed to remove {} after cancelled create: {}", name, e);
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("driver", &self.driver.name())
            .field("prefix", &self.names.prefix())
            .field("seed", &self.names.seed())
            .finish_non_exhaustive()
    }
}
