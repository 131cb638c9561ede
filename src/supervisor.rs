//! Supervisor core: admission gate, scan loop, age-killer, callback
//! dispatch, graceful-wait, signal broadcast.
//!
//! Scheduling model is single-threaded cooperative: the supervisor does no
//! background scanning of its own. Progress happens entirely inside calls
//! to `spawn` and `wait`, driven by the caller.

use crate::backend::{self, Backend, ChildStream};
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::kill_sequence::{self, KillSequence, KillStep};
use crate::line_reader::{self, LineBuffer};
use crate::process_guard::send_signal;
use crate::registry::{ChildRecord, ChildRegistry};
use crate::signal_handler::{self, PidSnapshot, SignalInstaller};
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Identifies a spawned child. Rust ownership rules don't let the caller
/// and the supervisor both hold the same mutable process handle the way the
/// source language does, so `spawn` hands back this lightweight id instead
/// — callers interact further via `Supervisor::send_signal`/`kids` (see
/// DESIGN.md for the rationale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildId(pub u32);

/// Read-only view of one child, passed to user callbacks. Exposes the
/// stdout/stderr line framing so `while_alive` can stream output without
/// the core having to understand it.
pub struct Kid<'a> {
    pid: u32,
    id: Option<&'a str>,
    cmdline: &'a [String],
    stdout: &'a mut Option<ChildStream>,
    stdout_buf: &'a mut LineBuffer,
    stderr: &'a mut Option<ChildStream>,
    stderr_buf: &'a mut LineBuffer,
}

impl<'a> Kid<'a> {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn id(&self) -> Option<&str> {
        self.id
    }

    pub fn cmdline(&self) -> &[String] {
        self.cmdline
    }

    /// Pull whatever complete stdout lines are currently available.
    pub fn stdout_lines(&mut self) -> Vec<String> {
        read_lines(self.stdout, self.stdout_buf)
    }

    /// Pull whatever complete stderr lines are currently available.
    pub fn stderr_lines(&mut self) -> Vec<String> {
        read_lines(self.stderr, self.stderr_buf)
    }
}

fn read_lines(stream: &mut Option<ChildStream>, buf: &mut LineBuffer) -> Vec<String> {
    let Some(s) = stream.as_mut() else {
        return Vec::new();
    };
    line_reader::read_available_lines(s, buf).unwrap_or_else(|e| {
        log::warn!("stream read failed: {}", e);
        Vec::new()
    })
}

/// A user callback. Boxed and `FnMut` so the caller can close over mutable
/// state (counters, channels); errors are communicated by panicking, which
/// the supervisor catches and swallows.
pub type Callback = Box<dyn for<'a> FnMut(&mut Kid<'a>) + Send>;

#[derive(Default)]
pub struct Callbacks {
    pub on_spawn: Option<Callback>,
    pub on_reap: Option<Callback>,
    pub while_alive: Option<Callback>,
}

/// Builder-style options for `Supervisor::new`.
pub struct SupervisorOptions {
    pub max_kids: u32,
    pub timeout: Duration,
    pub backend: String,
    pub debug: bool,
    pub kill_sequence: Option<KillSequence>,
    pub callbacks: Callbacks,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            max_kids: 0,
            timeout: Duration::ZERO,
            backend: backend::DEFAULT_BACKEND.to_string(),
            debug: false,
            kill_sequence: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl SupervisorOptions {
    pub fn from_config(config: &SupervisorConfig) -> Result<Self> {
        config.validate()?;
        let kill_sequence = match &config.kill_sequence {
            None => None,
            Some(steps) => {
                let mut resolved = Vec::with_capacity(steps.len());
                for step in steps {
                    let signal = crate::config::parse_signal_name(&step.signal)?;
                    resolved.push(KillStep::new(signal, step.wait_secs));
                }
                Some(KillSequence::new(resolved))
            }
        };
        Ok(Self {
            max_kids: config.max_kids,
            timeout: Duration::from_secs(config.timeout_secs),
            backend: config.backend.clone(),
            debug: config.debug,
            kill_sequence,
            callbacks: Callbacks::default(),
        })
    }
}

pub struct Supervisor {
    backend: Box<dyn Backend>,
    registry: ChildRegistry,
    max_kids: u32,
    timeout: Duration,
    debug: bool,
    kill_sequence: KillSequence,
    callbacks: Callbacks,
    pid_snapshot: PidSnapshot,
    signal_installer: Option<SignalInstaller>,
    wait_deadline: Option<Instant>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Result<Self> {
        let backend = backend::resolve(&options.backend)?;
        let pid_snapshot = signal_handler::new_pid_snapshot();
        let signal_installer = match SignalInstaller::install(pid_snapshot.clone()) {
            Ok(installer) => Some(installer),
            Err(e) => {
                log::warn!("failed to install signal handlers: {}", e);
                None
            }
        };

        if options.debug {
            log::info!(
                "supervisor constructed: max_kids={} timeout={:?} backend={:?}",
                options.max_kids,
                options.timeout,
                backend.name()
            );
        }

        Ok(Self {
            backend,
            registry: ChildRegistry::new(),
            max_kids: options.max_kids,
            timeout: options.timeout,
            debug: options.debug,
            kill_sequence: options.kill_sequence.unwrap_or_default(),
            callbacks: options.callbacks,
            pid_snapshot,
            signal_installer,
            wait_deadline: None,
        })
    }

    /// Spawn a new child, admission-gating on `max_kids` first.
    pub fn spawn(
        &mut self,
        cmdline: Vec<String>,
        id: Option<String>,
        extra: Option<HashMap<String, String>>,
    ) -> Result<ChildId> {
        self.sweep(false);

        if self.max_kids > 0 {
            while self.registry.len() as u32 >= self.max_kids {
                if self.debug {
                    log::debug!(
                        "admission blocked: {}/{} kids, waiting for a reap",
                        self.registry.len(),
                        self.max_kids
                    );
                }
                std::thread::sleep(Duration::from_secs(1));
                if self.sweep(true) {
                    break;
                }
            }
        }

        let extra = extra.unwrap_or_default();
        let mut handle = self.backend.start(&cmdline, &extra)?;
        let pid = handle.pid();
        let stdout_stream = handle.take_stdout();
        let stderr_stream = handle.take_stderr();

        let record = ChildRecord {
            handle,
            id,
            pid,
            started_at: Instant::now(),
            cmdline,
            extra,
            stdout_stream,
            stderr_stream,
            stdout_buf: LineBuffer::new(),
            stderr_buf: LineBuffer::new(),
        };

        self.registry.insert(record);
        self.sync_pid_snapshot();

        if self.callbacks.on_spawn.is_some() {
            self.invoke_on_spawn(pid);
        }

        Ok(ChildId(pid))
    }

    fn invoke_on_spawn(&mut self, pid: u32) {
        let Some(record) = self.registry.get_mut(pid) else {
            return;
        };
        let label = record.label().to_string();
        let mut cb = self.callbacks.on_spawn.take().expect("checked above");
        invoke_guarded("on_spawn", &label, || {
            let mut kid = Kid {
                pid: record.pid,
                id: record.id.as_deref(),
                cmdline: &record.cmdline,
                stdout: &mut record.stdout_stream,
                stdout_buf: &mut record.stdout_buf,
                stderr: &mut record.stderr_stream,
                stderr_buf: &mut record.stderr_buf,
            };
            cb(&mut kid);
        });
        self.callbacks.on_spawn = Some(cb);
    }

    /// Run sweeps with one-second sleeps until the registry empties (no
    /// timeout) or the deadline passes (promoting to a TERM broadcast).
    pub fn wait(&mut self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| *self.wait_deadline.get_or_insert(Instant::now() + t));

        loop {
            self.sweep(false);
            if self.registry.is_empty() {
                self.wait_deadline = None;
                return true;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            std::thread::sleep(Duration::from_secs(1));
        }

        log::info!(
            "wait deadline exceeded with {} survivor(s); broadcasting TERM",
            self.registry.len()
        );
        self.send_signal(Signal::SIGTERM);
        std::thread::sleep(Duration::from_secs(5));
        self.sweep(false);
        self.wait_deadline = None;
        self.registry.is_empty()
    }

    /// Send `sig` to every pid currently in the registry. Idempotent with
    /// respect to registry state: it never mutates the registry itself.
    pub fn send_signal(&self, sig: Signal) {
        for pid in self.registry.pids() {
            if let Err(e) = send_signal(pid, sig) {
                log::warn!("failed to send {:?} to pid {}: {}", sig, pid, e);
            }
        }
    }

    pub fn count_kids(&self) -> usize {
        self.registry.len()
    }

    /// Read-only snapshot of the current child records (pid, id, cmdline,
    /// age). Mutating the returned vector has no effect on the registry.
    pub fn kids(&self) -> Vec<KidSnapshot> {
        self.registry
            .values()
            .map(|r| KidSnapshot {
                pid: r.pid,
                id: r.id.clone(),
                cmdline: r.cmdline.clone(),
                age: r.age(),
            })
            .collect()
    }

    /// One sweep: run the age-killer, then reap terminated children and
    /// invoke `while_alive` on the rest. Returns `true` as soon as a reap
    /// happens, if `stop_after_first_reap` is set.
    fn sweep(&mut self, stop_after_first_reap: bool) -> bool {
        self.run_age_killer();

        let pids = self.registry.pids();
        for pid in pids {
            let terminated = match self.registry.get_mut(pid) {
                Some(record) => record.handle.is_terminated(),
                None => continue,
            };

            if terminated {
                self.reap(pid);
                if stop_after_first_reap {
                    return true;
                }
            } else if self.callbacks.while_alive.is_some() {
                self.invoke_while_alive(pid);
            }
        }

        false
    }

    fn invoke_while_alive(&mut self, pid: u32) {
        let Some(record) = self.registry.get_mut(pid) else {
            return;
        };
        let label = record.label().to_string();
        let cb = self.callbacks.while_alive.as_mut().expect("checked above");
        invoke_guarded("while_alive", &label, || {
            let mut kid = Kid {
                pid: record.pid,
                id: record.id.as_deref(),
                cmdline: &record.cmdline,
                stdout: &mut record.stdout_stream,
                stdout_buf: &mut record.stdout_buf,
                stderr: &mut record.stderr_stream,
                stderr_buf: &mut record.stderr_buf,
            };
            cb(&mut kid);
        });
    }

    /// For each record older than `timeout`, escalate via the backend's
    /// native termination or the generic kill-sequence executor. Blocks for
    /// the duration of each escalation; that is intentional.
    fn run_age_killer(&mut self) {
        if self.timeout.is_zero() {
            return;
        }
        let aged = self.registry.older_than(self.timeout);
        for pid in aged {
            let Some(record) = self.registry.get_mut(pid) else {
                continue;
            };
            log::info!(
                "pid {} ({}) exceeded age limit of {:?}; escalating",
                pid,
                record.label(),
                self.timeout
            );
            let sequence = self.kill_sequence.clone();
            let handled = record.handle.terminate(&sequence);
            if !handled {
                kill_sequence::execute(
                    &sequence,
                    |sig| {
                        if let Err(e) = send_signal(pid, sig) {
                            log::warn!("age-killer failed to signal pid {}: {}", pid, e);
                        }
                    },
                    || record.handle.is_terminated(),
                );
            }
        }
    }

    /// Remove the record, invoke `on_reap`, close the backend handle, and
    /// let the backend's `close` perform the final waitpid.
    fn reap(&mut self, pid: u32) {
        let Some(mut record) = self.registry.remove(pid) else {
            return;
        };
        self.sync_pid_snapshot();

        if let Some(cb) = self.callbacks.on_reap.as_mut() {
            let label = record.label().to_string();
            invoke_guarded("on_reap", &label, || {
                let mut kid = Kid {
                    pid: record.pid,
                    id: record.id.as_deref(),
                    cmdline: &record.cmdline,
                    stdout: &mut record.stdout_stream,
                    stdout_buf: &mut record.stdout_buf,
                    stderr: &mut record.stderr_stream,
                    stderr_buf: &mut record.stderr_buf,
                };
                cb(&mut kid);
            });
        }

        record.handle.close();
        if self.debug {
            log::debug!("reaped pid {} ({})", pid, record.label());
        }
    }

    fn sync_pid_snapshot(&self) {
        if let Ok(mut pids) = self.pid_snapshot.lock() {
            *pids = self.registry.pids();
        }
    }
}

/// A read-only snapshot of one child record, returned by `kids()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KidSnapshot {
    pub pid: u32,
    pub id: Option<String>,
    pub cmdline: Vec<String>,
    pub age: Duration,
}

/// Run `f`, catching panics so a broken callback never takes the
/// supervisor down with it.
fn invoke_guarded(which: &str, label: &str, f: impl FnOnce()) {
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        log::warn!("{} callback for {} panicked: {}", which, label, message);
    }
}
