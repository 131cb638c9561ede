//! The "full-featured" adapter: a thin wrapper over `std::process::Child`.
//!
//! `close` detaches the handle without waiting; the supervisor's own
//! kill-sequence executor is responsible for escalation (`terminate`
//! always returns `false`).

use super::{Backend, ChildHandle, ChildStream};
use crate::error::{Result, SupervisorError};
use crate::kill_sequence::KillSequence;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::process::{Child, Command, Stdio};

pub struct FullFeaturedBackend;

impl Backend for FullFeaturedBackend {
    fn name(&self) -> &'static str {
        "full-featured"
    }

    fn start(
        &self,
        cmdline: &[String],
        extra: &HashMap<String, String>,
    ) -> Result<Box<dyn ChildHandle>> {
        let (program, args) = cmdline
            .split_first()
            .ok_or_else(|| SupervisorError::spawn_failed("empty cmdline"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn_failed(e.to_string()))?;

        log::debug!("full-featured backend spawned pid {}", child.id());
        Ok(Box::new(FullFeaturedHandle {
            child,
            terminated: false,
            reaped: false,
        }))
    }
}

struct FullFeaturedHandle {
    child: Child,
    terminated: bool,
    reaped: bool,
}

impl ChildHandle for FullFeaturedHandle {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn is_terminated(&mut self) -> bool {
        if self.terminated {
            return true;
        }
        let result = match self.child.try_wait() {
            Ok(Some(_)) => {
                self.terminated = true;
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("try_wait failed for pid {}: {}", self.child.id(), e);
                self.terminated = true;
                true
            }
        };
        log::trace!("polled pid {}: terminated={}", self.child.id(), result);
        result
    }

    fn close(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;
        // Already known terminated (the core only calls close() after a
        // sweep observed termination), so this should return immediately.
        if let Err(e) = self.child.wait() {
            log::warn!("waitpid failed for pid {}: {}", self.child.id(), e);
        }
    }

    fn terminate(&mut self, _sequence: &KillSequence) -> bool {
        false
    }

    fn take_stdout(&mut self) -> Option<ChildStream> {
        self.child.stdout.take().map(into_nonblocking_stream)
    }

    fn take_stderr(&mut self) -> Option<ChildStream> {
        self.child.stderr.take().map(into_nonblocking_stream)
    }
}

fn into_nonblocking_stream<S: AsRawFd + std::io::Read + Send + 'static>(
    stream: S,
) -> ChildStream {
    let fd = stream.as_raw_fd();
    if let Ok(flags) = fcntl(fd, FcntlArg::F_GETFL) {
        let flags = OFlag::from_bits_truncate(flags);
        let _ = fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK));
    }
    Box::new(stream)
}
