//! # poddeploy-deployer
//!
//! Podman deployment connector for PodDeploy.
//! Launches images as podman containers and hands each one back as an
//! attached stdin/stdout stream with an id and a teardown operation.
//!
//! ## Features
//!
//! - Unique `prefix_suffix` container names from a seeded, lock-guarded generator
//! - cgroup namespace / network mode passthrough (`private`, `host`,
//!   `container:<id>`, `ns:<path>`, `none`, `bridge:...`)
//! - Atomic start + attach, so early workload output is never lost
//! - Cooperative cancellation of deploys
//! - Idempotent, retryable teardown
//!
//! ## Usage
//!
//! ```ignore
//! use poddeploy_deployer::{ConnectorFactory, DeployerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let connector = ConnectorFactory::new().create(DeployerConfig::default())?;
//! let mut container = connector.deploy(&CancellationToken::new(), "alpine:latest").await?;
//! container.write(b"ping abc\n").await?;
//! let n = container.read(&mut buf).await?;
//! container.close().await?;
//! ```

pub mod connector;
pub mod driver;
pub mod factory;
pub mod handle;
pub mod naming;

#[cfg(test)]
pub(crate) mod testing;

pub use connector::Connector;
pub use driver::{AttachedStream, Diagnostics, ExitClass, InvocationSpec, PodmanCli, RuntimeDriver};
pub use factory::{resolve_binary, ConnectorFactory};
pub use handle::{ContainerHandle, HandleState};
pub use naming::{NameGenerator, SUFFIX_LEN};

// Foundation re-exports
pub use poddeploy_foundation::{
    CgroupNamespace, DeployerConfig, Error, NetworkMode, Result,
};
