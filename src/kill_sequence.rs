//! Kill-sequence executor
//!
//! Runs an ordered `(signal, wait-seconds)` escalation against one child
//! until it exits or the sequence is exhausted. Used by the age-killer and
//! by backends that have no native escalation of their own.

use nix::sys::signal::Signal;
use std::thread;
use std::time::Duration;

/// One step of an escalation: send `signal`, then poll for up to
/// `wait_secs` seconds before moving to the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillStep {
    pub signal: Signal,
    pub wait_secs: u64,
}

impl KillStep {
    pub fn new(signal: Signal, wait_secs: u64) -> Self {
        Self { signal, wait_secs }
    }
}

/// An ordered escalation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillSequence(Vec<KillStep>);

impl KillSequence {
    pub fn new(steps: Vec<KillStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[KillStep] {
        &self.0
    }

    /// Sum of every step's wait-seconds; the executor's worst-case wall time.
    pub fn total_wait_secs(&self) -> u64 {
        self.0.iter().map(|s| s.wait_secs).sum()
    }
}

impl Default for KillSequence {
    /// `INT/3, INT/5, TERM/2, TERM/8, KILL/3, KILL/7`.
    fn default() -> Self {
        Self(vec![
            KillStep::new(Signal::SIGINT, 3),
            KillStep::new(Signal::SIGINT, 5),
            KillStep::new(Signal::SIGTERM, 2),
            KillStep::new(Signal::SIGTERM, 8),
            KillStep::new(Signal::SIGKILL, 3),
            KillStep::new(Signal::SIGKILL, 7),
        ])
    }
}

/// Run `sequence` against a pid, polling `is_terminated` to decide whether
/// to stop early. Never blocks longer than `sequence.total_wait_secs()`.
///
/// `send` and `is_terminated` are injected so callers (and tests) can stub
/// out the actual OS calls.
pub fn execute<S, T>(sequence: &KillSequence, mut send: S, mut is_terminated: T)
where
    S: FnMut(Signal),
    T: FnMut() -> bool,
{
    for step in sequence.steps() {
        if is_terminated() {
            log::debug!("kill-sequence: child already terminated, stopping early");
            return;
        }

        log::debug!(
            "kill-sequence: sending {:?}, polling up to {}s",
            step.signal,
            step.wait_secs
        );
        send(step.signal);

        for _ in 0..step.wait_secs {
            if is_terminated() {
                return;
            }
            thread::sleep(Duration::from_secs(1));
        }
    }
    log::debug!("kill-sequence: exhausted without confirming termination");
}
