//! Configuration management module
//!
//! Typed, validated construction options for the supervisor, optionally
//! loaded from a TOML file and overridden by environment variables, before
//! being handed to `Supervisor::new`. Shaped like `config_file.rs`: a
//! serde-backed, file-loadable configuration struct with its own
//! `validate()`.

use crate::error::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One step of a custom kill sequence, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillStepConfig {
    pub signal: String,
    pub wait_secs: u64,
}

/// Construction-time options for a `Supervisor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Admission cap; `0` disables the cap.
    #[serde(default)]
    pub max_kids: u32,
    /// Per-child age limit in seconds; `0` disables age-killing.
    #[serde(default)]
    pub timeout_secs: u64,
    /// Adapter selector: `"full-featured"` or `"process-group"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Emits diagnostic messages on significant transitions.
    #[serde(default)]
    pub debug: bool,
    /// Optional override of the default kill sequence.
    #[serde(default)]
    pub kill_sequence: Option<Vec<KillStepConfig>>,
}

fn default_backend() -> String {
    crate::backend::DEFAULT_BACKEND.to_string()
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_kids: 0,
            timeout_secs: 0,
            backend: default_backend(),
            debug: false,
            kill_sequence: None,
        }
    }
}

impl SupervisorConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `ARCHSUP_*` environment variable overrides, if present.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ARCHSUP_MAX_KIDS") {
            if let Ok(n) = v.parse() {
                self.max_kids = n;
            } else {
                log::warn!("ignoring malformed ARCHSUP_MAX_KIDS={:?}", v);
            }
        }
        if let Ok(v) = std::env::var("ARCHSUP_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.timeout_secs = n;
            } else {
                log::warn!("ignoring malformed ARCHSUP_TIMEOUT={:?}", v);
            }
        }
        if let Ok(v) = std::env::var("ARCHSUP_BACKEND") {
            self.backend = v;
        }
        if let Ok(v) = std::env::var("ARCHSUP_KILL_SEQUENCE") {
            match parse_kill_sequence_env(&v) {
                Ok(steps) => self.kill_sequence = Some(steps),
                Err(e) => log::warn!("ignoring malformed ARCHSUP_KILL_SEQUENCE={:?}: {}", v, e),
            }
        }
    }

    /// Validate the configuration, rejecting anything that would otherwise
    /// misbehave silently at runtime (unknown backend, malformed kill
    /// sequence steps).
    pub fn validate(&self) -> Result<()> {
        crate::backend::resolve(&self.backend)?;

        if let Some(steps) = &self.kill_sequence {
            if steps.is_empty() {
                return Err(SupervisorError::config(
                    "kill_sequence override must not be empty",
                ));
            }
            for step in steps {
                parse_signal_name(&step.signal)?;
                if step.wait_secs == 0 {
                    return Err(SupervisorError::config(format!(
                        "kill_sequence step for signal {:?} must have wait_secs > 0",
                        step.signal
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Parse `ARCHSUP_KILL_SEQUENCE`'s `"SIG:wait_secs,SIG:wait_secs,..."`
/// format, e.g. `"TERM:5,KILL:3"`.
fn parse_kill_sequence_env(raw: &str) -> Result<Vec<KillStepConfig>> {
    let mut steps = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (signal, wait_secs) = entry.split_once(':').ok_or_else(|| {
            SupervisorError::config(format!("expected SIGNAL:wait_secs, got {:?}", entry))
        })?;
        parse_signal_name(signal)?;
        let wait_secs: u64 = wait_secs
            .trim()
            .parse()
            .map_err(|_| SupervisorError::config(format!("bad wait_secs in {:?}", entry)))?;
        steps.push(KillStepConfig {
            signal: signal.trim().to_string(),
            wait_secs,
        });
    }
    if steps.is_empty() {
        return Err(SupervisorError::config(
            "kill_sequence override must not be empty",
        ));
    }
    Ok(steps)
}

pub(crate) fn parse_signal_name(name: &str) -> Result<nix::sys::signal::Signal> {
    use nix::sys::signal::Signal;
    match name.to_uppercase().as_str() {
        "INT" | "SIGINT" => Ok(Signal::SIGINT),
        "TERM" | "SIGTERM" => Ok(Signal::SIGTERM),
        "KILL" | "SIGKILL" => Ok(Signal::SIGKILL),
        "HUP" | "SIGHUP" => Ok(Signal::SIGHUP),
        other => Err(SupervisorError::config(format!(
            "unrecognized signal name: {}",
            other
        ))),
    }
}
