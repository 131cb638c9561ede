//! The "process-group" adapter.
//!
//! Spawns the child as the leader of its own process group
//! (`CommandProcessGroup::in_new_process_group`) so that signaling the
//! group reaches anything the child itself forks. `close` blocks, with a
//! bounded timeout, waiting for the child to exit. `terminate` delegates to
//! the backend's own group-wide kill-sequence rather than falling back to
//! the generic single-pid executor.

use super::{Backend, ChildHandle, ChildStream};
use crate::error::{Result, SupervisorError};
use crate::kill_sequence::{self, KillSequence};
use crate::process_guard::{send_signal_to_group, CommandProcessGroup};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// How long `close` polls for a natural exit before giving up.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProcessGroupBackend;

impl Backend for ProcessGroupBackend {
    fn name(&self) -> &'static str {
        "process-group"
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
            .stderr(Stdio::piped())
            .in_new_process_group();

        let child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn_failed(e.to_string()))?;

        log::debug!("process-group backend spawned pid {} (own pgid)", child.id());
        Ok(Box::new(ProcessGroupHandle {
            child,
            terminated: false,
            reaped: false,
        }))
    }
}

struct ProcessGroupHandle {
    child: Child,
    terminated: bool,
    reaped: bool,
}

impl ChildHandle for ProcessGroupHandle {
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

        let deadline = Instant::now() + CLOSE_TIMEOUT;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        log::warn!(
                            "pid {} did not exit within close timeout; abandoning wait",
                            self.child.id()
                        );
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    log::warn!("waitpid failed for pid {}: {}", self.child.id(), e);
                    return;
                }
            }
        }
    }

    fn terminate(&mut self, sequence: &KillSequence) -> bool {
        let pid = self.child.id();
        kill_sequence::execute(
            sequence,
            |sig| {
                if let Err(e) = send_signal_to_group(pid, sig) {
                    log::warn!("failed to signal group {}: {}", pid, e);
                }
            },
            || self.is_terminated(),
        );
        true
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
