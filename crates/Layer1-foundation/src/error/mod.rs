//! Error types for PodDeploy
//!
//! All errors surfaced by the foundation and deployer crates live here.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// PodDeploy error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Runtime binary invocations
    // ========================================================================
    #[error("Runtime command `{command}` failed (exit code {}): {}", display_code(.exit_code), .stderr.trim())]
    Runtime {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    // ========================================================================
    // Container lifecycle
    // ========================================================================
    #[error("Failed to deploy {image}: {source}")]
    Deploy {
        image: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Teardown of container {container} failed: {source}")]
    Teardown {
        container: String,
        #[source]
        source: Box<Error>,
    },

    // ========================================================================
    // Execution
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl Error {
    /// Wrap a failure that happened while deploying `image`
    pub fn deploy(image: impl Into<String>, source: Error) -> Self {
        Error::Deploy {
            image: image.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a stop/remove failure for `container`
    pub fn teardown(container: impl Into<String>, source: Error) -> Self {
        Error::Teardown {
            container: container.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error came from tearing a container down
    pub fn is_teardown(&self) -> bool {
        matches!(self, Error::Teardown { .. })
    }

    /// Exit status of the failed runtime invocation, if any
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::Runtime { exit_code, .. } => *exit_code,
            Error::Deploy { source, .. } | Error::Teardown { source, .. } => source.exit_code(),
            _ => None,
        }
    }

    /// Diagnostic output captured from the runtime, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Error::Runtime { stderr, .. } if !stderr.trim().is_empty() => Some(stderr.trim()),
            Error::Deploy { source, .. } | Error::Teardown { source, .. } => source.diagnostics(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(code: Option<i32>, stderr: &str) -> Error {
        Error::Runtime {
            command: "podman create".to_string(),
            exit_code: code,
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_runtime_display() {
        let err = runtime(Some(125), "Error: image not known\n");
        assert_eq!(
            err.to_string(),
            "Runtime command `podman create` failed (exit code 125): Error: image not known"
        );

        let err = runtime(None, "");
        assert!(err.to_string().contains("exit code none"));
    }

    #[test]
    fn test_deploy_wrapper_exposes_cause() {
        let err = Error::deploy("alpine", runtime(Some(125), "boom"));
        assert_eq!(err.exit_code(), Some(125));
        assert_eq!(err.diagnostics(), Some("boom"));
        assert!(err.to_string().starts_with("Failed to deploy alpine"));
        assert!(!err.is_teardown());
    }

    #[test]
    fn test_teardown_wrapper() {
        let err = Error::teardown("abc", runtime(Some(1), ""));
        assert!(err.is_teardown());
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.diagnostics(), None);
    }
}
