//! Signal-handler installer.
//!
//! Installs INT/TERM handlers on construction that forward the received
//! signal to every currently-registered child pid, then let the default
//! disposition proceed so the host process still dies per policy. Prior
//! handlers are restored when the installer is dropped.
//!
//! Uses the same "background thread drains a `signal_hook::iterator::Signals`
//! stream" shape as `process_guard::init_signal_handlers` to keep actual
//! signal-handler code out of async-signal-unsafe territory (no locking or
//! logging inside a real OS signal handler).

use crate::process_guard::send_signal;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Shared view of the registry's current pids, kept in sync by the
/// supervisor on every insert/remove. This is the only registry-adjacent
/// state touched from a thread other than the supervisor's own.
pub type PidSnapshot = Arc<Mutex<Vec<u32>>>;

pub fn new_pid_snapshot() -> PidSnapshot {
    Arc::new(Mutex::new(Vec::new()))
}

/// INT/TERM dispositions captured just before `Signals::new` installs its
/// own handler, restored when the installer is dropped.
struct PriorHandlers {
    int: SigAction,
    term: SigAction,
}

/// Read the disposition currently installed for `sig` without leaving it
/// changed. `sigaction(2)` only reports the old disposition as a side
/// effect of installing a new one, so this installs a throwaway one and
/// immediately puts back what it read.
fn snapshot_disposition(sig: Signal) -> nix::Result<SigAction> {
    let probe = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let old = unsafe { signal::sigaction(sig, &probe)? };
    unsafe { signal::sigaction(sig, &old)? };
    Ok(old)
}

pub struct SignalInstaller {
    running: Arc<AtomicBool>,
    handle: Option<Handle>,
    thread: Option<JoinHandle<()>>,
    prior: PriorHandlers,
}

impl SignalInstaller {
    /// Install handlers for SIGINT and SIGTERM. Returns an error if the
    /// underlying `signal_hook::iterator::Signals` registration fails.
    pub fn install(pids: PidSnapshot) -> std::io::Result<Self> {
        let prior = PriorHandlers {
            int: snapshot_disposition(Signal::SIGINT)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
            term: snapshot_disposition(Signal::SIGTERM)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
        };

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle_for_drop = signals.handle();
        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = running.clone();

        let thread = std::thread::spawn(move || {
            for raw_sig in &mut signals {
                if !running_for_thread.load(Ordering::SeqCst) {
                    break;
                }
                let signal = match raw_sig {
                    SIGINT => Signal::SIGINT,
                    SIGTERM => Signal::SIGTERM,
                    _ => continue,
                };

                log::info!("received {:?}, broadcasting to {} kid(s)", signal, {
                    pids.lock().map(|p| p.len()).unwrap_or(0)
                });

                let snapshot = pids.lock().map(|p| p.clone()).unwrap_or_default();
                for pid in snapshot {
                    if let Err(e) = send_signal(pid, signal) {
                        log::warn!("failed to forward {:?} to pid {}: {}", signal, pid, e);
                    }
                }

                if let Err(e) = signal_hook::low_level::emulate_default_handler(raw_sig) {
                    log::warn!("failed to emulate default handler for {:?}: {}", signal, e);
                }
            }
        });

        Ok(Self {
            running,
            handle: Some(handle_for_drop),
            thread: Some(thread),
            prior,
        })
    }
}

impl Drop for SignalInstaller {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        if let Err(e) = unsafe { signal::sigaction(Signal::SIGINT, &self.prior.int) } {
            log::warn!("failed to restore prior SIGINT handler: {}", e);
        }
        if let Err(e) = unsafe { signal::sigaction(Signal::SIGTERM, &self.prior.term) } {
            log::warn!("failed to restore prior SIGTERM handler: {}", e);
        }
        log::debug!("signal handlers restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_drop_does_not_panic() {
        let pids = new_pid_snapshot();
        let installer = SignalInstaller::install(pids).expect("install signal handlers");
        drop(installer);
    }

    #[test]
    fn install_and_drop_restores_prior_disposition() {
        let before = snapshot_disposition(Signal::SIGINT).unwrap();
        let before_default = matches!(before.handler(), SigHandler::SigDfl);

        let pids = new_pid_snapshot();
        let installer = SignalInstaller::install(pids).expect("install signal handlers");
        drop(installer);

        let after = snapshot_disposition(Signal::SIGINT).unwrap();
        let after_default = matches!(after.handler(), SigHandler::SigDfl);
        assert_eq!(before_default, after_default);
    }

    #[test]
    fn pid_snapshot_reflects_pushed_pids() {
        let pids = new_pid_snapshot();
        pids.lock().unwrap().push(1234);
        assert_eq!(pids.lock().unwrap().clone(), vec![1234]);
    }
}
