//! In-memory driver for unit tests

use crate::driver::{AttachedStream, InvocationSpec, RuntimeDriver};
use async_trait::async_trait;
use parking_lot::Mutex;
use poddeploy_foundation::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Records every call; each operation can be made to fail once.
/// Attached containers answer `ping X` with `pong X` and end on `exit`.
#[derive(Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<String>>,
    specs: Mutex<Vec<InvocationSpec>>,
    fail_create: AtomicBool,
    fail_attach: AtomicBool,
    fail_stop: AtomicBool,
    fail_remove: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    attach_delay: Mutex<Option<Duration>>,
}

impl RecordingDriver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn specs(&self) -> Vec<InvocationSpec> {
        self.specs.lock().clone()
    }

    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_attach(&self) {
        self.fail_attach.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_remove(&self) {
        self.fail_remove.store(true, Ordering::SeqCst);
    }

    pub fn delay_create(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    pub fn delay_attach(&self, delay: Duration) {
        *self.attach_delay.lock() = Some(delay);
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn failure(flag: &AtomicBool, command: &str) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(Error::Runtime {
                command: command.to_string(),
                exit_code: Some(125),
                stderr: format!("Error: {} refused", command),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeDriver for RecordingDriver {
    async fn create(&self, spec: &InvocationSpec) -> Result<String> {
        self.record(format!("create {}", spec.name));
        self.specs.lock().push(spec.clone());
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::failure(&self.fail_create, "podman create")?;
        Ok(format!("id-{}", spec.name))
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.record(format!("start {}", id));
        Ok(())
    }

    async fn attach(&self, id: &str) -> Result<AttachedStream> {
        self.record(format!("attach {}", id));
        let delay = *self.attach_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::failure(&self.fail_attach, "podman start --attach")?;

        let (ours, theirs) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(theirs);
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line == "exit" {
                    break;
                }
                if let Some(arg) = line.strip_prefix("ping ") {
                    if write_half
                        .write_all(format!("pong {}\n", arg).as_bytes())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        });

        let (read_half, write_half) = tokio::io::split(ours);
        Ok(AttachedStream::from_pipes(write_half, read_half))
    }

    async fn stop(&self, id: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("stop {}", id));
        Self::failure(&self.fail_stop, "podman stop")
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.record(format!("rm {}", id));
        Self::failure(&self.fail_remove, "podman rm")
    }

    async fn inspect(&self, id: &str, _format: &str) -> Result<String> {
        self.record(format!("inspect {}", id));
        Ok("running".to_string())
    }

    async fn version(&self) -> Result<String> {
        Ok("podman version 0.0.0-recording".to_string())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
