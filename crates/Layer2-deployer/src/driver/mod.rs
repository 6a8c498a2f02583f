//! Subprocess driver
//!
//! The only layer that talks to the runtime binary:
//! - `invocation` - the resolved `create` request and its argument vector
//! - `cli` - `PodmanCli`, the tokio::process implementation
//! - `output` - id parsing, exit classification, stderr capture
//!
//! No operation retries. A failed invocation is reported with its exit
//! status and captured stderr.

pub mod cli;
pub mod invocation;
pub mod output;

pub use cli::PodmanCli;
pub use invocation::InvocationSpec;
pub use output::{Diagnostics, ExitClass};

use async_trait::async_trait;
use poddeploy_foundation::Result;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

/// Container runtime driver - implement to target another runtime binary
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    /// Create a container, returning the runtime-assigned id
    async fn create(&self, spec: &InvocationSpec) -> Result<String>;

    /// Start a created container without attaching to it
    async fn start(&self, id: &str) -> Result<()>;

    /// Start (if needed) and attach to a container's stdin/stdout
    async fn attach(&self, id: &str) -> Result<AttachedStream>;

    /// Stop a container, killing it after `timeout`
    async fn stop(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Force-remove a container; removing a missing container succeeds
    async fn remove(&self, id: &str) -> Result<()>;

    /// Render a Go template against the container's inspect data
    async fn inspect(&self, id: &str, format: &str) -> Result<String>;

    /// Runtime version string
    async fn version(&self) -> Result<String>;

    /// Get driver name
    fn name(&self) -> &'static str;
}

/// Duplex byte stream bound to a container's stdin/stdout
pub struct AttachedStream {
    /// Container stdin
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,

    /// Container stdout
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,

    /// The attach process, when the stream is backed by one
    pub process: Option<Child>,

    /// Stderr of the attach process
    pub diagnostics: Diagnostics,
}

impl AttachedStream {
    /// Stream over arbitrary pipes, with no backing process
    pub fn from_pipes(
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            process: None,
            diagnostics: Diagnostics::new(),
        }
    }
}

impl std::fmt::Debug for AttachedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedStream")
            .field("pid", &self.process.as_ref().and_then(|p| p.id()))
            .finish_non_exhaustive()
    }
}
