//! kidpool demo — a small CLI exercising the supervisor end to end.
//!
//! Not part of the library's public contract; a manual smoke-testing
//! convenience in the same `clap`-derive, `env_logger`-init, subcommand-
//! dispatch shape as `cli.rs`/`main.rs`.

use clap::{Parser, Subcommand};
use kidpool::kill_sequence::{KillSequence, KillStep};
use kidpool::supervisor::{Callbacks, Kid, SupervisorOptions};
use kidpool::{Supervisor, SupervisorConfig};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kidpool-demo")]
#[command(about = "Smoke-test front end for the kidpool process supervisor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn a bounded pool of shell commands from a config file and wait on them.
    Run {
        /// Path to a TOML `SupervisorConfig`; defaults are used if omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Shell commands to run, one child per argument.
        #[arg(required = true)]
        commands: Vec<String>,
        /// Seconds to wait for all children before broadcasting TERM.
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Spawn a single signal-ignoring stub and watch the kill-sequence escalate.
    KillDemo {
        /// Seconds the stub sleeps for; should exceed the sequence's total wait.
        #[arg(short, long, default_value_t = 60)]
        sleep_secs: u64,
    },
}

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;

    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            commands,
            timeout,
        } => run(config, commands, timeout),
        Commands::KillDemo { sleep_secs } => kill_demo(sleep_secs),
    }
}

fn run(config: Option<PathBuf>, commands: Vec<String>, timeout: Option<u64>) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => SupervisorConfig::from_file(&path)?,
        None => SupervisorConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;

    let mut options = SupervisorOptions::from_config(&config)?;
    options.callbacks = Callbacks {
        on_spawn: Some(Box::new(|kid: &mut Kid| {
            info!("spawned pid {} ({:?})", kid.pid(), kid.id());
        })),
        on_reap: Some(Box::new(|kid: &mut Kid| {
            info!("reaped pid {}", kid.pid());
        })),
        while_alive: Some(Box::new(|kid: &mut Kid| {
            for line in kid.stdout_lines() {
                println!("[{}] {}", kid.pid(), line);
            }
        })),
    };

    let mut supervisor = Supervisor::new(options)?;
    for command in commands {
        let cmdline: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        supervisor.spawn(cmdline, None, None)?;
    }

    let all_reaped = supervisor.wait(timeout.map(Duration::from_secs));
    if !all_reaped {
        warn!("some children survived the wait deadline");
        let survivors = serde_json::to_string_pretty(&supervisor.kids())
            .unwrap_or_else(|e| format!("<failed to serialize survivors: {}>", e));
        println!("{}", survivors);
    }
    info!("done, {} kid(s) remaining", supervisor.count_kids());
    Ok(())
}

fn kill_demo(sleep_secs: u64) -> anyhow::Result<()> {
    let sequence = KillSequence::new(vec![
        KillStep::new(nix::sys::signal::Signal::SIGTERM, 2),
        KillStep::new(nix::sys::signal::Signal::SIGKILL, 2),
    ]);
    let mut options = SupervisorOptions {
        timeout: Duration::from_secs(1),
        kill_sequence: Some(sequence),
        ..SupervisorOptions::default()
    };
    options.callbacks.on_reap = Some(Box::new(|kid: &mut Kid| {
        info!("kill-demo stub (pid {}) reaped", kid.pid());
    }));

    let mut supervisor = Supervisor::new(options)?;
    supervisor.spawn(
        vec![
            "bash".to_string(),
            "-c".to_string(),
            format!("trap '' INT TERM; sleep {}", sleep_secs),
        ],
        Some("kill-demo-stub".to_string()),
        None,
    )?;

    let reaped = supervisor.wait(Some(Duration::from_secs(sleep_secs)));
    info!("kill-demo finished, all reaped: {}", reaped);
    Ok(())
}
