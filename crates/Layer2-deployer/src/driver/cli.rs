//! Podman CLI driver
//!
//! Runs the runtime binary through tokio::process:
//! - `create` / `start` / `stop` / `rm` / `inspect` are short-lived and awaited
//! - attach is one long-lived `start --attach --interactive` process whose
//!   stdin/stdout become the container stream, so nothing the workload prints
//!   between start and attach is lost

use super::output::{
    check_status, classify_exit, parse_container_id, Diagnostics, ExitClass,
};
use super::{AttachedStream, InvocationSpec, RuntimeDriver};
use async_trait::async_trait;
use poddeploy_foundation::{Error, Result, DEFAULT_ATTACH_TIMEOUT_SECS};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inspect template for the container state
const STATE_FORMAT: &str = "{{.State.Status}}";

/// Container states that mean the start has gone through
const STARTED_STATES: [&str; 4] = ["running", "exited", "stopped", "paused"];

/// Podman CLI driver
#[derive(Debug, Clone)]
pub struct PodmanCli {
    /// Resolved runtime binary
    binary: PathBuf,

    /// Upper bound for a container to report as started during attach
    attach_timeout: Duration,

    /// Interval between state checks during attach
    poll_interval: Duration,
}

impl PodmanCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            attach_timeout: Duration::from_secs(DEFAULT_ATTACH_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the runtime binary
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// "podman create", "podman rm", ... for error messages
    fn describe(&self, subcommand: &str) -> String {
        let program = self
            .binary
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.binary.display().to_string());
        format!("{} {}", program, subcommand)
    }

    fn spawn_error(&self, subcommand: &str, err: std::io::Error) -> Error {
        Error::Runtime {
            command: self.describe(subcommand),
            exit_code: None,
            stderr: format!("failed to spawn {}: {}", self.binary.display(), err),
        }
    }

    /// Run one short-lived invocation to completion
    async fn run(&self, args: &[&str]) -> Result<Output> {
        let subcommand = args.first().copied().unwrap_or_default();
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(subcommand, e))?;

        check_status(&self.describe(subcommand), output.status, &output.stderr)?;
        Ok(output)
    }

    /// Forward the attach process's stderr to tracing and keep it for diagnostics
    fn collect_stderr(id: &str, stderr: ChildStderr, diagnostics: Diagnostics) -> JoinHandle<()> {
        let id = short_id(id).to_string();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!("[{}] {}", id, line);
                diagnostics.push(line);
            }
        })
    }

    /// Wait until the runtime reports the container as started, or the
    /// attach process ends. A runtime failure code from the attach process is
    /// an error; any other exit is the workload's own. The whole wait,
    /// including hung state checks, is bounded by the attach timeout.
    async fn wait_until_started(
        &self,
        id: &str,
        child: &mut Child,
        stderr_task: &mut Option<JoinHandle<()>>,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        let waiting = self.poll_started(id, child, stderr_task, diagnostics);
        match tokio::time::timeout(self.attach_timeout, waiting).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "container {} did not start within {:.1}s",
                short_id(id),
                self.attach_timeout.as_secs_f64()
            ))),
        }
    }

    async fn poll_started(
        &self,
        id: &str,
        child: &mut Child,
        stderr_task: &mut Option<JoinHandle<()>>,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    return self.attach_exit(id, status, stderr_task, diagnostics).await;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    match self.inspect(id, STATE_FORMAT).await {
                        Ok(state) if state == "running" => return Ok(()),
                        Ok(state) if STARTED_STATES.contains(&state.as_str()) => {
                            // Already finished; let a failing attach process report first
                            return match tokio::time::timeout(self.poll_interval, child.wait()).await {
                                Ok(status) => {
                                    self.attach_exit(id, status?, stderr_task, diagnostics).await
                                }
                                Err(_) => Ok(()),
                            };
                        }
                        Ok(state) => debug!("Container {} is {}, waiting for start", short_id(id), state),
                        Err(e) => debug!("State check for {} failed: {}", short_id(id), e),
                    }
                }
            }
        }
    }

    async fn attach_exit(
        &self,
        id: &str,
        status: std::process::ExitStatus,
        stderr_task: &mut Option<JoinHandle<()>>,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        match classify_exit(status) {
            ExitClass::RuntimeFailure => {
                // Drain the rest of stderr before reporting
                if let Some(task) = stderr_task.take() {
                    let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
                }
                Err(Error::Runtime {
                    command: self.describe("start --attach"),
                    exit_code: status.code(),
                    stderr: diagnostics.snapshot(),
                })
            }
            class => {
                debug!(
                    "Container {} finished while attaching ({:?})",
                    short_id(id),
                    class
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RuntimeDriver for PodmanCli {
    async fn create(&self, spec: &InvocationSpec) -> Result<String> {
        let args = spec.build_args();
        let mut full_args = vec!["create"];
        full_args.extend(args.iter().map(String::as_str));

        info!("Creating container {} from {}", spec.name, spec.image);
        let output = self.run(&full_args).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = parse_container_id(&stdout).ok_or_else(|| Error::Runtime {
            command: self.describe("create"),
            exit_code: output.status.code(),
            stderr: format!(
                "could not parse a container id from output {:?}; stderr: {}",
                stdout.trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })?;

        debug!("Created container {} as {}", spec.name, id);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        info!("Starting container: {}", short_id(id));
        self.run(&["start", id]).await?;
        Ok(())
    }

    async fn attach(&self, id: &str) -> Result<AttachedStream> {
        info!("Attaching to container: {}", short_id(id));

        let mut child = Command::new(&self.binary)
            .args(["start", "--attach", "--interactive", id])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error("start --attach", e))?;

        let diagnostics = Diagnostics::new();
        let mut stderr_task = child
            .stderr
            .take()
            .map(|stderr| Self::collect_stderr(id, stderr, diagnostics.clone()));

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(Error::Stream(format!(
                    "attach process for {} has no stdio pipes",
                    short_id(id)
                )));
            }
        };

        if let Err(e) = self
            .wait_until_started(id, &mut child, &mut stderr_task, &diagnostics)
            .await
        {
            warn!("Attach to {} failed: {}", short_id(id), e);
            let _ = child.start_kill();
            return Err(e);
        }

        Ok(AttachedStream {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            process: Some(child),
            diagnostics,
        })
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<()> {
        info!("Stopping container: {}", short_id(id));
        let secs = timeout.as_secs().max(1).to_string();
        self.run(&["stop", "--ignore", "--time", secs.as_str(), id]).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        info!("Removing container: {}", short_id(id));
        self.run(&["rm", "--force", "--ignore", id]).await?;
        Ok(())
    }

    async fn inspect(&self, id: &str, format: &str) -> Result<String> {
        let output = self.run(&["inspect", "--format", format, id]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn version(&self) -> Result<String> {
        let output = self.run(&["--version"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn name(&self) -> &'static str {
        "podman"
    }
}

/// First 12 characters of an id, the way the runtime prints it
pub(crate) fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
