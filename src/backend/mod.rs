//! Backend adapters: a uniform view over whatever actually spawns processes.
//!
//! The supervisor core never calls `std::process` or `nix` directly — it
//! only ever talks to a `Box<dyn ChildHandle>` obtained from a `Backend`.
//! This keeps the escalation policy (kill-sequence executor) and the
//! spawning mechanics (process groups, pdeathsig, pipe plumbing) decoupled,
//! mirroring the split `process_guard::CommandProcessGroup` (mechanics)
//! draws from escalation policy.

pub mod full_featured;
pub mod process_group;

use crate::error::{Result, SupervisorError};
use crate::kill_sequence::KillSequence;
use std::collections::HashMap;
use std::io::Read;

/// A non-blocking handle on one of a child's output streams.
pub type ChildStream = Box<dyn Read + Send>;

/// Capability set a backend exposes over one spawned child.
pub trait ChildHandle: Send {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Non-blocking liveness check.
    fn is_terminated(&mut self) -> bool;

    /// Release backend-side resources. Idempotent from the supervisor's
    /// perspective — may be called exactly once per handle by `_reap`.
    fn close(&mut self);

    /// Backend-preferred termination. Returns `true` if the backend
    /// performed (or is performing) its own escalation and the generic
    /// kill-sequence executor should not also run; `false` to fall back to
    /// the default executor against `pid()`.
    fn terminate(&mut self, sequence: &KillSequence) -> bool;

    /// Take the child's stdout stream, if one was requested and has not
    /// already been taken.
    fn take_stdout(&mut self) -> Option<ChildStream>;

    /// Take the child's stderr stream, if one was requested and has not
    /// already been taken.
    fn take_stderr(&mut self) -> Option<ChildStream>;
}

/// A pluggable adapter that knows how to `start` a child and hand back a
/// `ChildHandle` for it.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn start(
        &self,
        cmdline: &[String],
        extra: &HashMap<String, String>,
    ) -> Result<Box<dyn ChildHandle>>;
}

/// Resolve a backend by name. Known names: `"full-featured"` and
/// `"process-group"`.
pub fn resolve(name: &str) -> Result<Box<dyn Backend>> {
    match name {
        "full-featured" => Ok(Box::new(full_featured::FullFeaturedBackend)),
        "process-group" => Ok(Box::new(process_group::ProcessGroupBackend)),
        other => Err(SupervisorError::backend_not_found(other)),
    }
}

/// The default backend when none is named at construction.
pub const DEFAULT_BACKEND: &str = "process-group";
