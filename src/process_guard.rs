//! Low-level process-group mechanics shared by the backend adapters.
//!
//! This module owns the bits that talk to `nix`/`libc` directly: spawning a
//! child into its own process group, setting its parent-death signal, and
//! signaling either a single pid or a whole group. Nothing here knows about
//! the registry, sweeps, or escalation policy — that lives in `supervisor`
//! and `kill_sequence`.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Send a signal to a single pid. `ESRCH` (already gone) is not an error.
pub fn send_signal(pid: u32, sig: Signal) -> Result<(), nix::Error> {
    match signal::kill(Pid::from_raw(pid as i32), sig) {
        Err(nix::Error::ESRCH) => Ok(()),
        other => other,
    }
}

/// Send a signal to an entire process group via a negative pid. `ESRCH` is
/// not an error.
pub fn send_signal_to_group(pgid: u32, sig: Signal) -> Result<(), nix::Error> {
    match signal::kill(Pid::from_raw(-(pgid as i32)), sig) {
        Err(nix::Error::ESRCH) => Ok(()),
        other => other,
    }
}

/// Check if a process is alive and not a zombie.
///
/// A zombie can still receive signals but has already exited; for the
/// supervisor's purposes it counts as terminated.
pub fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Extension trait for `std::process::Command` that sets up process-group
/// isolation: the child becomes the leader of its own process group, and
/// dies automatically if this process dies first (`PR_SET_PDEATHSIG`).
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    fn wait_for_death(pid: u32, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if !is_process_alive(pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn send_signal_to_nonexistent_pid_is_ok() {
        assert!(send_signal(999_999, Signal::SIGTERM).is_ok());
    }

    #[test]
    fn is_process_alive_nonexistent() {
        assert!(!is_process_alive(999_999));
    }

    #[test]
    fn process_group_kill_reaches_grandchildren() {
        let mut child = Command::new("bash")
            .args(["-c", "sleep 60 & wait"])
            .in_new_process_group()
            .spawn()
            .expect("spawn bash");
        let pid = child.id();

        std::thread::sleep(Duration::from_millis(100));
        assert!(is_process_alive(pid));

        send_signal_to_group(pid, Signal::SIGKILL).unwrap();
        let _ = child.wait();

        assert!(wait_for_death(pid, Duration::from_secs(2)));
    }
}
