//! Error handling module for the supervisor
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All fallible operations in the crate return these types for consistency.

use thiserror::Error;

/// Main error type for the supervisor.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// IO errors (spawn failures, pipe reads, waitpid).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `nix` errno failures (kill, setpgid, waitpid).
    #[error("OS error: {0}")]
    Errno(#[from] nix::Error),

    /// Constructor was given an unrecognized backend name.
    #[error("unknown backend: {0}")]
    BackendNotFound(String),

    /// The backend could not launch the child process.
    #[error("failed to spawn child: {0}")]
    SpawnFailed(String),

    /// Constructor options or a loaded `SupervisorConfig` failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// TOML parse failure while loading a `SupervisorConfig` from disk.
    #[error("failed to parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

impl SupervisorError {
    /// Create a `BackendNotFound` error.
    pub fn backend_not_found(name: impl Into<String>) -> Self {
        Self::BackendNotFound(name.into())
    }

    /// Create a `SpawnFailed` error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a `Config` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Placeholder id used in log lines when a child was spawned without one.
pub const NO_ID: &str = "[no ID provided]";
