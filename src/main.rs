//! Pacer CLI
//!
//! Usage:
//!   pacer                                   # Breathing session in the terminal
//!   pacer --preset meditation               # Guided meditation
//!   pacer --preset neck --samples rec.txt   # Replay recorded head-tilt readings
//!   pacer --table my_table.json             # Custom phase table
//!   pacer --json                            # JSON lines output
//!   pacer --serve                           # HTTP + WebSocket API server
//!
//! While a session runs, type a command and press Enter:
//!   p  pause/resume    s  skip phase    g  continue past a guide
//!   q  quit            0.31  head-tilt reading (neck preset)

use clap::Parser;
use colored::Colorize;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pacer::core::presets::{self, PRESET_NAMES};
use pacer::core::{
    run_server, run_session, ticker_for, Command, CueDispatcher, CueSink, JsonLinesPresenter,
    PresentationSink, SampleProvider, ScriptedSamples, SessionController, SilentNarrator,
    SystemClock, TerminalAmbient, TerminalNarrator, TerminalPresenter,
};
use pacer::error::{ExitCode, PacerError};
use pacer::logging::{init_logging, LogFormat};
use pacer::core::posture::parse_sample;
use pacer::types::{Cadence, PhaseTable, SessionStatus, TableSpec};
use pacer::VERSION;

/// Spacing between replayed samples
const REPLAY_FRAME_MS: u64 = 100;

#[derive(Parser, Debug)]
#[command(
    name = "pacer",
    version = VERSION,
    about = "Pacer - Guided breathing, meditation and neck-stretch sessions",
    long_about = "Pacer walks you through a timed session, one phase at a time.\n\n\
                  Presets:\n  \
                  breathing   - Breathe in 5s, breathe out 5s, for 3 minutes\n  \
                  meditation  - Guided intro, then 6 minutes with a halfway reminder\n  \
                  neck        - Head down, neutral, head down; held by posture readings\n\n\
                  Commands while running (type + Enter):\n  \
                  p  pause/resume   s  skip   g  continue   q  quit\n  \
                  <number>          head-tilt ratio reading"
)]
struct Args {
    /// Built-in session (breathing, meditation, neck)
    #[arg(short, long, default_value = "breathing")]
    preset: String,

    /// Custom phase table (JSON file), overrides --preset
    #[arg(short, long)]
    table: Option<PathBuf>,

    /// Replay head-tilt readings from a file, one per line
    #[arg(long)]
    samples: Option<PathBuf>,

    /// Tick interval in milliseconds for fixed-cadence tables
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Do not print narration cues
    #[arg(long)]
    mute: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// List built-in presets and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let format = if args.log_json { LogFormat::Json } else { LogFormat::Human };
    init_logging(format, args.verbose, args.no_color);
    if args.no_color {
        colored::control::set_override(false);
    }

    let code = match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(args: &Args) -> Result<i32, PacerError> {
    if args.list {
        list_presets();
        return Ok(ExitCode::SUCCESS);
    }
    if args.serve {
        run_serve(args).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let table = load_table(args)?;
    let status = run_local(table, args).await?;
    Ok(match status {
        SessionStatus::Abandoned => ExitCode::ABANDONED,
        _ => ExitCode::SUCCESS,
    })
}

/// Resolve the table from --table or --preset, applying --tick-ms
fn load_table(args: &Args) -> Result<PhaseTable, PacerError> {
    let mut spec = match &args.table {
        Some(path) => TableSpec::from_file(path)?,
        None => presets::spec_by_name(&args.preset)?,
    };
    if let (Some(ms), Cadence::Fixed { .. }) = (args.tick_ms, spec.cadence) {
        spec.cadence = Cadence::Fixed { interval_secs: ms as f64 / 1000.0 };
    }
    let table = spec.build()?;
    info!(table = table.name(), phases = table.len(), "table loaded");
    Ok(table)
}

/// Run one session in the terminal
async fn run_local(table: PhaseTable, args: &Args) -> Result<SessionStatus, PacerError> {
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::channel(64);

    let presenter: Box<dyn PresentationSink> = if args.json {
        Box::new(JsonLinesPresenter::new(io::stdout()))
    } else {
        Box::new(TerminalPresenter::new(args.no_color))
    };
    // JSON mode already carries cues in its output
    let narrator: Box<dyn CueSink> = if args.mute || args.json {
        Box::new(SilentNarrator::new(done_tx))
    } else {
        Box::new(TerminalNarrator::new(done_tx, !args.no_color))
    };

    if !args.json {
        print_header(table.name(), args.no_color);
    }

    let mut cues = CueDispatcher::new(narrator);
    if table.ambient() && !args.mute && !args.json {
        cues = cues.with_ambient(Box::new(TerminalAmbient::new(!args.no_color)));
    }

    let ticker = ticker_for(table.cadence());
    let mut controller =
        SessionController::new(table, presenter, cues, std::sync::Arc::new(SystemClock::new()));

    spawn_stdin_reader(cmd_tx.clone());
    if let Some(path) = &args.samples {
        let samples = ScriptedSamples::parse(&std::fs::read_to_string(path)?);
        info!(count = samples.len(), "replaying samples");
        spawn_replay(samples, cmd_tx.clone());
    }
    let quit_tx = cmd_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit_tx.send(Command::Quit).await;
        }
    });

    let status = run_session(&mut controller, ticker, cmd_rx, done_rx).await?;

    if !args.json {
        let state = controller.machine().state();
        println!();
        println!(
            "Session {}. Phases completed: {}, time: {}",
            status.to_string().to_lowercase(),
            state.phases_completed,
            pacer::types::format_clock(state.total_elapsed)
        );
    }
    Ok(status)
}

/// Map stdin lines to commands on a blocking thread
fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let Some(command) = parse_command(&line) else {
                debug!(input = line.trim(), "unrecognised input");
                continue;
            };
            if tx.blocking_send(command).is_err() {
                break;
            }
        }
    });
}

fn spawn_replay(mut samples: ScriptedSamples, tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        let mut frames = tokio::time::interval(Duration::from_millis(REPLAY_FRAME_MS));
        while let Some(value) = samples.next_sample() {
            frames.tick().await;
            if tx.send(Command::Sample { value }).await.is_err() {
                return;
            }
        }
        warn!("sample replay exhausted");
    });
}

/// Parse a typed command
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => None,
        "p" | "pause" => Some(Command::TogglePause),
        "r" | "resume" => Some(Command::Resume),
        "s" | "skip" => Some(Command::Skip),
        "g" | "go" | "continue" => Some(Command::OpenGate),
        "q" | "quit" | "exit" => Some(Command::Quit),
        "-" => Some(Command::Sample { value: None }),
        other => parse_sample(other).map(|value| Command::Sample { value: Some(value) }),
    }
}

/// Print header
fn print_header(table: &str, no_color: bool) {
    let title = format!("Pacer v{} - {}", VERSION, table);
    if no_color {
        println!("========================================");
        println!("  {}", title);
        println!("========================================");
    } else {
        println!("{}", "╔════════════════════════════════════════╗".bold());
        println!("{}", format!("║  {:<38}║", title).bold());
        println!("{}", "╚════════════════════════════════════════╝".bold());
    }
    println!("Commands: p pause/resume, s skip, g continue, q quit");
    println!();
}

fn list_presets() {
    for name in PRESET_NAMES {
        match presets::by_name(name) {
            Ok(table) => {
                let phases: Vec<&str> = table.phases().iter().map(|p| p.name.as_str()).collect();
                println!("{:<12} {}", name, phases.join(" -> "));
            }
            Err(err) => println!("{:<12} invalid: {}", name, err),
        }
    }
}

/// Run HTTP API server
async fn run_serve(args: &Args) -> Result<(), PacerError> {
    println!();
    println!("Pacer API Server v{}", VERSION);
    println!();
    run_server(&args.addr).await?;
    Ok(())
}
