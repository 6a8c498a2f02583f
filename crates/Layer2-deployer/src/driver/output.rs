//! Runtime output parsing and failure classification

use parking_lot::Mutex;
use poddeploy_foundation::{Error, Result};
use regex::Regex;
use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::{Arc, OnceLock};

/// Exit codes the runtime reserves for its own failures, as opposed to the
/// workload's exit code which `start --attach` passes through
pub const RUNTIME_ERROR_CODES: [i32; 3] = [125, 126, 127];

fn container_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]{12,64}$").expect("valid container id regex"))
}

/// Extract the container id from `create` output.
///
/// The id is the last non-empty stdout line; pull progress and warnings may
/// precede it.
pub fn parse_container_id(stdout: &str) -> Option<String> {
    let last = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    if container_id_regex().is_match(last) {
        Some(last.to_string())
    } else {
        None
    }
}

/// How a finished runtime process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    /// The runtime itself failed (bad flags, missing container, daemon trouble)
    RuntimeFailure,
    /// The workload ran and exited non-zero
    WorkloadExit(i32),
    /// Killed by a signal
    Signaled,
}

pub fn classify_exit(status: ExitStatus) -> ExitClass {
    match status.code() {
        Some(0) => ExitClass::Success,
        Some(code) if RUNTIME_ERROR_CODES.contains(&code) => ExitClass::RuntimeFailure,
        Some(code) => ExitClass::WorkloadExit(code),
        None => ExitClass::Signaled,
    }
}

/// Build the error for a failed invocation
pub fn runtime_error(command: impl Into<String>, status: ExitStatus, stderr: &[u8]) -> Error {
    Error::Runtime {
        command: command.into(),
        exit_code: status.code(),
        stderr: String::from_utf8_lossy(stderr).to_string(),
    }
}

/// Check an invocation's exit status, turning failures into `Error::Runtime`
pub fn check_status(command: &str, status: ExitStatus, stderr: &[u8]) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(runtime_error(command, status, stderr))
    }
}

/// Stderr of a long-lived process, collected line by line
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    lines: Arc<Mutex<VecDeque<String>>>,
}

/// Lines kept per process; older lines are dropped first
const MAX_DIAGNOSTIC_LINES: usize = 256;

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == MAX_DIAGNOSTIC_LINES {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Everything captured so far, newline separated
    pub fn snapshot(&self) -> String {
        let lines = self.lines.lock();
        let mut out = String::new();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }
}
