//! End-to-end scenarios against real child processes.
//!
//! Same style as `tests/integration_death_pact.rs`: real spawned processes,
//! assertions on observable state rather than mocked collaborators.

use kidpool::kill_sequence::{KillSequence, KillStep};
use kidpool::supervisor::{Callbacks, Kid, SupervisorOptions};
use kidpool::Supervisor;
use nix::sys::signal::Signal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounded pool never exceeds `max_kids`, all five reap.
#[test]
fn bounded_pool_never_exceeds_max_kids() {
    let reaps = Arc::new(AtomicUsize::new(0));
    let reaps_cb = reaps.clone();

    let mut options = SupervisorOptions {
        max_kids: 2,
        backend: "full-featured".to_string(),
        ..SupervisorOptions::default()
    };
    options.callbacks = Callbacks {
        on_reap: Some(Box::new(move |_kid: &mut Kid| {
            reaps_cb.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    };

    let mut supervisor = Supervisor::new(options).unwrap();
    let mut peak = 0;
    for _ in 0..5 {
        supervisor
            .spawn(vec!["sleep".to_string(), "1".to_string()], None, None)
            .unwrap();
        peak = peak.max(supervisor.count_kids());
        assert!(supervisor.count_kids() <= 2);
    }

    assert!(supervisor.wait(Some(Duration::from_secs(10))));
    assert_eq!(reaps.load(Ordering::SeqCst), 5);
    assert!(peak <= 2);
}

/// Age-killer escalates and reaps a long-lived child within the timeout
/// plus the custom sequence's total wait.
#[test]
fn age_kill_reaps_an_overstaying_child() {
    let reaps = Arc::new(AtomicUsize::new(0));
    let reaps_cb = reaps.clone();

    let mut options = SupervisorOptions {
        timeout: Duration::from_secs(2),
        backend: "full-featured".to_string(),
        kill_sequence: Some(KillSequence::new(vec![
            KillStep::new(Signal::SIGTERM, 1),
            KillStep::new(Signal::SIGKILL, 1),
        ])),
        ..SupervisorOptions::default()
    };
    options.callbacks.on_reap = Some(Box::new(move |_kid: &mut Kid| {
        reaps_cb.fetch_add(1, Ordering::SeqCst);
    }));

    let mut supervisor = Supervisor::new(options).unwrap();
    supervisor
        .spawn(vec!["sleep".to_string(), "30".to_string()], None, None)
        .unwrap();

    // No deadline: `wait` loops sweeps (which run the age-killer) until the
    // registry empties, which the age-killer guarantees within timeout + the
    // sequence's total wait.
    assert!(supervisor.wait(None));
    assert_eq!(reaps.load(Ordering::SeqCst), 1);
}

/// A signal-ignoring child survives the graceful window; the terminal TERM
/// broadcast alone can't kill it (no KILL is sent by `wait` itself), so it
/// is left for the caller either way. We finish the job with a direct
/// SIGKILL so the test doesn't leak a process.
#[test]
fn graceful_wait_survivor_can_be_force_killed_by_caller() {
    let mut options = SupervisorOptions {
        backend: "full-featured".to_string(),
        ..SupervisorOptions::default()
    };
    let reaps = Arc::new(AtomicUsize::new(0));
    let reaps_cb = reaps.clone();
    options.callbacks.on_reap = Some(Box::new(move |_kid: &mut Kid| {
        reaps_cb.fetch_add(1, Ordering::SeqCst);
    }));

    let mut supervisor = Supervisor::new(options).unwrap();
    supervisor
        .spawn(
            vec![
                "bash".to_string(),
                "-c".to_string(),
                "trap '' INT TERM; sleep 60".to_string(),
            ],
            None,
            None,
        )
        .unwrap();

    // wait() promotes to a TERM broadcast after the 1s deadline, sleeps 5s,
    // sweeps once more, and returns whether the registry is now empty.
    let all_reaped = supervisor.wait(Some(Duration::from_secs(1)));

    if !all_reaped {
        supervisor.send_signal(Signal::SIGKILL);
        assert!(supervisor.wait(Some(Duration::from_secs(5))));
    }
    assert_eq!(reaps.load(Ordering::SeqCst), 1);
}

/// A callback that always panics is isolated and does not stop the sweep
/// from reaping the rest.
#[test]
fn panicking_callback_does_not_stop_reaping() {
    let mut options = SupervisorOptions {
        backend: "full-featured".to_string(),
        ..SupervisorOptions::default()
    };
    options.callbacks.on_reap = Some(Box::new(|_kid: &mut Kid| {
        panic!("on_reap always fails in this test");
    }));

    let mut supervisor = Supervisor::new(options).unwrap();
    for _ in 0..3 {
        supervisor
            .spawn(vec!["true".to_string()], None, None)
            .unwrap();
    }

    assert!(supervisor.wait(Some(Duration::from_secs(10))));
    assert_eq!(supervisor.count_kids(), 0);
}

/// `send_signal` reaches every live child immediately, ahead of any
/// age-based escalation.
#[test]
fn signal_broadcast_reaches_live_children() {
    let mut options = SupervisorOptions {
        backend: "full-featured".to_string(),
        ..SupervisorOptions::default()
    };
    let reaps = Arc::new(AtomicUsize::new(0));
    let reaps_cb = reaps.clone();
    options.callbacks.on_reap = Some(Box::new(move |_kid: &mut Kid| {
        reaps_cb.fetch_add(1, Ordering::SeqCst);
    }));

    let mut supervisor = Supervisor::new(options).unwrap();
    supervisor
        .spawn(vec!["sleep".to_string(), "60".to_string()], None, None)
        .unwrap();

    supervisor.send_signal(Signal::SIGTERM);
    assert!(supervisor.wait(Some(Duration::from_secs(5))));
    assert_eq!(reaps.load(Ordering::SeqCst), 1);
}

/// An unknown backend in a loaded config fails validation before a
/// supervisor is ever constructed.
#[test]
fn bad_config_is_rejected_before_construction() {
    use kidpool::SupervisorConfig;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kidpool.toml");
    std::fs::write(&path, "backend = \"telepathy\"\n").unwrap();

    let config = SupervisorConfig::from_file(&path).unwrap();
    let err = SupervisorOptions::from_config(&config).unwrap_err();
    assert!(matches!(err, kidpool::SupervisorError::BackendNotFound(_)));
}
