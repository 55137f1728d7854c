//! Async session loop
//!
//! Multiplexes ticks, user commands and cue completions into one
//! controller. Everything runs on the caller's task, so session state is
//! only ever touched by one callback at a time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::clock::Ticker;
use crate::core::controller::SessionController;
use crate::core::cue::{CueSink, UtteranceId};
use crate::core::presenter::PresentationSink;
use crate::error::SessionError;
use crate::types::{tick_interval, Cadence, SessionStatus};
use crate::DEFAULT_TICK_SECS;

/// User or sensor input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Pause,
    Resume,
    TogglePause,
    Skip,
    Quit,
    OpenGate,
    Sample { value: Option<f64> },
}

/// Ticker for the table's cadence; frame-driven tables tick on samples instead
///
/// Built tables always carry a usable interval; anything else falls back to
/// the default cadence.
pub fn ticker_for(cadence: Cadence) -> Option<Ticker> {
    match cadence {
        Cadence::Fixed { interval_secs } => {
            let interval = tick_interval(interval_secs).unwrap_or_else(|| {
                warn!(interval_secs, "unusable tick interval, using default");
                Duration::from_secs(DEFAULT_TICK_SECS as u64)
            });
            Some(Ticker::start(interval))
        }
        Cadence::Frames => None,
    }
}

/// Start the session and drive it until it is completed or abandoned
///
/// A closed command channel stops command handling but does not quit.
pub async fn run_session<P, C>(
    controller: &mut SessionController<P, C>,
    mut ticker: Option<Ticker>,
    mut commands: mpsc::Receiver<Command>,
    mut completions: mpsc::UnboundedReceiver<UtteranceId>,
) -> Result<SessionStatus, SessionError>
where
    P: PresentationSink,
    C: CueSink,
{
    if controller.status() == SessionStatus::NotStarted {
        controller.start()?;
    }

    let mut commands_open = true;
    let mut completions_open = true;

    while !controller.status().is_terminal() {
        tokio::select! {
            tick = next_tick(&mut ticker) => match tick {
                Some(tick) => {
                    controller.tick(tick.delta_secs);
                }
                None => ticker = None,
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => handle(controller, command),
                None => {
                    debug!("command channel closed");
                    commands_open = false;
                }
            },
            done = completions.recv(), if completions_open => match done {
                Some(id) => {
                    controller.cue_finished(id);
                }
                None => completions_open = false,
            },
        }

        // Frame-driven session with no input left: nothing can advance it
        if ticker.is_none() && !commands_open && !controller.status().is_terminal() {
            debug!("no tick source or commands left");
            break;
        }
    }

    if let Some(ticker) = ticker.as_mut() {
        ticker.stop();
    }
    let status = controller.status();
    info!(%status, "session loop finished");
    Ok(status)
}

async fn next_tick(ticker: &mut Option<Ticker>) -> Option<crate::core::clock::Tick> {
    match ticker {
        Some(ticker) => ticker.next().await,
        None => std::future::pending().await,
    }
}

fn handle<P: PresentationSink, C: CueSink>(controller: &mut SessionController<P, C>, command: Command) {
    let result = match command {
        Command::Pause => controller.pause().map(Some),
        Command::Resume => controller.resume().map(Some),
        Command::TogglePause => controller.toggle_pause().map(Some),
        Command::Skip => controller.skip().map(Some),
        Command::Quit => controller.quit().map(Some),
        Command::OpenGate => controller.open_gate().map(Some),
        Command::Sample { value } => Ok(controller.offer_sample(value)),
    };
    if let Err(err) = result {
        debug!(?command, error = %err, "command rejected");
    }
}
