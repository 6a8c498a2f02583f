//! Container handle
//!
//! The caller-facing side of one deployed container: its runtime id, the
//! attached stdin/stdout stream and the teardown operation.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──bind(stream)──▶ Running ──close()──▶ Closed
//!    │                                             ▲
//!    └──────────────────close()────────────────────┘
//! ```
//!
//! `Created` only exists inside a deploy. A container that exits on its own
//! stays `Running` until `close()`; reads then return end-of-stream.

use crate::driver::cli::short_id;
use crate::driver::{AttachedStream, Diagnostics, RuntimeDriver};
use poddeploy_foundation::{Error, Result};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::process::Child;
use tracing::{debug, info, warn};

/// Grace period for the attach process to exit after the container is gone
const REAP_GRACE: Duration = Duration::from_secs(5);

/// Handle lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Container created, stream not yet attached
    Created,
    /// Started and attached
    Running,
    /// Stream released, container stopped/removed (terminal)
    Closed,
}

impl HandleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleState::Closed)
    }
}

impl std::fmt::Display for HandleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandleState::Created => "Created",
            HandleState::Running => "Running",
            HandleState::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}

/// Teardown steps already done; a later close only repeats what failed
#[derive(Debug, Default, Clone, Copy)]
struct Teardown {
    stopped: bool,
    removed: bool,
}

impl Teardown {
    fn is_complete(&self) -> bool {
        self.stopped && self.removed
    }
}

/// One deployed container
pub struct ContainerHandle {
    /// Runtime-assigned id
    id: String,

    /// Generated container name
    name: String,

    state: HandleState,

    stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    stdout: Option<Box<dyn AsyncRead + Send + Unpin>>,

    /// Attach process backing the stream
    process: Option<Child>,

    diagnostics: Diagnostics,

    /// End-of-stream observed
    exited: bool,

    teardown: Teardown,

    driver: Arc<dyn RuntimeDriver>,
    stop_timeout: Duration,
}

impl ContainerHandle {
    /// Handle for a created, not yet attached container
    pub(crate) fn created(
        id: impl Into<String>,
        name: impl Into<String>,
        driver: Arc<dyn RuntimeDriver>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: HandleState::Created,
            stdin: None,
            stdout: None,
            process: None,
            diagnostics: Diagnostics::new(),
            exited: false,
            teardown: Teardown::default(),
            driver,
            stop_timeout,
        }
    }

    /// Bind the attached stream: Created -> Running
    pub(crate) fn bind(&mut self, stream: AttachedStream) {
        debug_assert_eq!(self.state, HandleState::Created);
        self.stdin = Some(stream.stdin);
        self.stdout = Some(stream.stdout);
        self.process = stream.process;
        self.diagnostics = stream.diagnostics;
        self.state = HandleState::Running;
    }

    /// Runtime-assigned container id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Generated container name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether a read has observed end-of-stream
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Stderr captured from the attach process so far
    pub fn diagnostics(&self) -> String {
        self.diagnostics.snapshot()
    }

    fn stream_error(&self) -> Error {
        match self.state {
            HandleState::Closed => {
                Error::Stream(format!("container {} is closed", short_id(&self.id)))
            }
            _ => Error::Stream(format!("container {} is not attached", short_id(&self.id))),
        }
    }

    /// Forward bytes to the container's stdin
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.state != HandleState::Running {
            return Err(self.stream_error());
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.stream_error());
        };

        stdin.write_all(buf).await?;
        stdin.flush().await?;
        Ok(buf.len())
    }

    /// Read container output. `Ok(0)` means the container's output has ended.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.state != HandleState::Running {
            return Err(self.stream_error());
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(self.stream_error());
        };

        let n = stdout.read(buf).await?;
        if n == 0 && !buf.is_empty() && !self.exited {
            debug!("Container {} reached end of output", short_id(&self.id));
            self.exited = true;
        }
        Ok(n)
    }

    /// Stop and remove the container and release the stream.
    ///
    /// Every step is attempted and the first failure is returned. Calling
    /// again only repeats the steps that failed; once everything succeeded it
    /// is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state.is_terminal() && self.teardown.is_complete() {
            return Ok(());
        }

        if !self.state.is_terminal() {
            debug!("Closing container {} ({})", short_id(&self.id), self.name);
            self.state = HandleState::Closed;
            if let Some(mut stdin) = self.stdin.take() {
                let _ = stdin.shutdown().await;
            }
            self.stdout = None;
        }

        let mut first_error: Option<Error> = None;

        if !self.teardown.stopped {
            match self.driver.stop(&self.id, self.stop_timeout).await {
                Ok(()) => self.teardown.stopped = true,
                Err(e) => {
                    warn!("Failed to stop container {}: {}", short_id(&self.id), e);
                    first_error.get_or_insert(Error::teardown(&self.id, e));
                }
            }
        }

        if !self.teardown.removed {
            match self.driver.remove(&self.id).await {
                Ok(()) => {
                    // a removed container needs no further stop
                    self.teardown.removed = true;
                    self.teardown.stopped = true;
                }
                Err(e) => {
                    warn!("Failed to remove container {}: {}", short_id(&self.id), e);
                    first_error.get_or_insert(Error::teardown(&self.id, e));
                }
            }
        }

        self.reap().await;

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Closed container {} ({})", short_id(&self.id), self.name);
                Ok(())
            }
        }
    }

    /// Wait for the attach process, killing it if it outlives the container
    async fn reap(&mut self) {
        let Some(mut child) = self.process.take() else {
            return;
        };

        match tokio::time::timeout(REAP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(
                "Attach process for {} exited with {}",
                short_id(&self.id),
                status
            ),
            Ok(Err(e)) => warn!(
                "Failed to wait for attach process of {}: {}",
                short_id(&self.id),
                e
            ),
            Err(_) => {
                warn!(
                    "Attach process for {} still running after teardown, killing",
                    short_id(&self.id)
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill attach process: {}", e);
                }
            }
        }
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.teardown.removed {
            return;
        }

        warn!(
            "Container {} dropped without a successful close, removing in background",
            short_id(&self.id)
        );

        // The attach process is killed on drop; the container itself is not
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let driver = Arc::clone(&self.driver);
            let id = std::mem::take(&mut self.id);
            runtime.spawn(async move {
                if let Err(e) = driver.remove(&id).await {
                    warn!("Background removal of {} failed: {}", short_id(&id), e);
                }
            });
        }
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("exited", &self.exited)
            .field("driver", &self.driver.name())
            .finish()
    }
}

fn closed_io_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "container handle is not running")
}

impl AsyncRead for ContainerHandle {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(stdout) = this.stdout.as_mut() else {
            return Poll::Ready(Err(closed_io_error()));
        };

        let before = buf.filled().len();
        let poll = Pin::new(stdout).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            if buf.filled().len() == before && buf.remaining() > 0 {
                this.exited = true;
            }
        }
        poll
    }
}

impl AsyncWrite for ContainerHandle {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_write(cx, buf),
            None => Poll::Ready(Err(closed_io_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_flush(cx),
            None => Poll::Ready(Err(closed_io_error())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
