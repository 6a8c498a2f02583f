//! Config - deployer configuration
//!
//! - `deployer.rs` - DeployerConfig and its sections, file loading, validation
//! - `modes.rs` - cgroup namespace / network passthrough values

mod deployer;
mod modes;

pub use deployer::{
    ContainerOptions, DeployerConfig, DeploymentConfig, HostOptions, PodmanConfig,
    DEFAULT_ATTACH_TIMEOUT_SECS, DEFAULT_CONTAINER_NAME_PREFIX, DEFAULT_PODMAN_PATH,
    DEFAULT_STOP_TIMEOUT_SECS,
};
pub use modes::{CgroupNamespace, NetworkMode};
