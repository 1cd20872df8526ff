use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use gantry_host::config::Config;
use gantry_host::control::Controller;
use gantry_host::machine::{self, MachineState};
use gantry_host::recorder::LogRecorder;

#[derive(Debug, Parser)]
#[command(
    name = "gantry-host",
    about = "G-code motion controller for a two-axis stepper positioning rig"
)]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// G-code program to execute. Reads programs line by line from stdin
    /// when omitted.
    program: Option<PathBuf>,

    /// Status poll interval while a program runs, in milliseconds.
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,

    /// Maximum log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| {
            tracing::error!(path = %path.display(), "failed to load configuration: {e}");
            e
        })?,
        None => {
            tracing::info!("no configuration file given, using defaults");
            Config::default()
        }
    };
    tracing::info!(
        backend = ?config.machine.backend,
        steps_per_mm = config.machine.steps_per_mm,
        "starting gantry-host"
    );

    let state = Arc::new(MachineState::default());
    let machine = machine::probe(&config, Arc::clone(&state), Box::new(LogRecorder));
    let controller = Controller::new(machine, state);

    match &cli.program {
        Some(path) => {
            let src = std::fs::read_to_string(path)?;
            run_program(&controller, &src, cli.poll_ms)?;
        }
        None => repl(&controller, cli.poll_ms)?,
    }
    Ok(())
}

/// Run one program to completion, polling status at the transport cadence.
fn run_program(
    controller: &Controller,
    src: &str,
    poll_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let queued = controller.load_program(src)?;
    if queued == 0 {
        tracing::warn!("no executable commands in program");
        return Ok(());
    }
    controller.play();

    let mut seen_running = false;
    loop {
        std::thread::sleep(Duration::from_millis(poll_ms));
        let status = controller.status();
        if status.running {
            seen_running = true;
        }
        if !status.running && (seen_running || !status.program_loaded) {
            println!("{}", serde_json::to_string(&status)?);
            break;
        }
    }
    Ok(())
}

fn repl(controller: &Controller, poll_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("reading programs from stdin, one per line");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        run_program(controller, &line, poll_ms)?;
    }
    Ok(())
}
