//! kidpool: a bounded-concurrency process supervisor.
//!
//! Spawn external commands under an admission cap, let the supervisor reap
//! them as they exit, escalate signals against anything that overstays a
//! configured age limit, and observe their stdout/stderr line-by-line from
//! callbacks — all driven cooperatively from calls to [`Supervisor::spawn`]
//! and [`Supervisor::wait`], with no background scanning thread of its own.

pub mod backend;
pub mod config;
pub mod error;
pub mod kill_sequence;
pub mod line_reader;
pub mod process_guard;
pub mod registry;
pub mod signal_handler;
pub mod supervisor;

pub use backend::{Backend, ChildHandle, ChildStream};
pub use config::{KillStepConfig, SupervisorConfig};
pub use error::{Result, SupervisorError};
pub use kill_sequence::{KillSequence, KillStep};
pub use process_guard::CommandProcessGroup;
pub use supervisor::{
    Callback, Callbacks, ChildId, Kid, KidSnapshot, Supervisor, SupervisorOptions,
};
