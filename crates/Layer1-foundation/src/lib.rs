//! # poddeploy-foundation
//!
//! Foundation layer for PodDeploy:
//! - Error: the error taxonomy shared by every layer
//! - Config: deployer configuration, file loading, syntactic validation
//! - Modes: typed cgroup namespace / network passthrough values
//!
//! ## Configuration shape
//!
//! ```text
//! {
//!   "podman":     { path, containerNamePrefix, rngSeed, cgroupNs, networkMode, ... },
//!   "deployment": { "container": { Env, NetworkDisabled, ... }, "host": { Binds, ... } }
//! }
//! ```

pub mod config;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    CgroupNamespace, ContainerOptions, DeployerConfig, DeploymentConfig, HostOptions,
    NetworkMode, PodmanConfig, DEFAULT_ATTACH_TIMEOUT_SECS, DEFAULT_CONTAINER_NAME_PREFIX,
    DEFAULT_PODMAN_PATH, DEFAULT_STOP_TIMEOUT_SECS,
};
