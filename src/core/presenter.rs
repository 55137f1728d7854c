//! Presentation sinks
//!
//! Sinks receive copies only. Rendering failures are logged, never fed
//! back into the session.

use std::io::Write;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::cue::UtteranceId;
use crate::types::{PhaseTarget, ReasonCode, SessionSnapshot};

/// Receives phase changes, ticks and the session outcome
pub trait PresentationSink {
    fn on_phase_changed(&mut self, label: &str, target: PhaseTarget);
    fn on_tick(&mut self, phase_elapsed: f64, total_elapsed: f64);
    fn on_completed(&mut self);
    fn on_abandoned(&mut self);

    /// Spoken cue, for sinks that mirror narration (captions, remote clients)
    fn on_cue(&mut self, _id: UtteranceId, _text: &str) {}

    /// Full snapshot after every tick or action
    fn on_snapshot(&mut self, _snapshot: &SessionSnapshot) {}
}

impl<T: PresentationSink + ?Sized> PresentationSink for Box<T> {
    fn on_phase_changed(&mut self, label: &str, target: PhaseTarget) {
        (**self).on_phase_changed(label, target)
    }
    fn on_tick(&mut self, phase_elapsed: f64, total_elapsed: f64) {
        (**self).on_tick(phase_elapsed, total_elapsed)
    }
    fn on_completed(&mut self) {
        (**self).on_completed()
    }
    fn on_abandoned(&mut self) {
        (**self).on_abandoned()
    }
    fn on_cue(&mut self, id: UtteranceId, text: &str) {
        (**self).on_cue(id, text)
    }
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        (**self).on_snapshot(snapshot)
    }
}

/// Wire form of presentation events (JSON lines, websocket)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    PhaseChanged { label: String, target: PhaseTarget },
    Tick { phase_elapsed: f64, total_elapsed: f64 },
    Cue { utterance: UtteranceId, text: String },
    /// Active narration cut short
    CueCancelled,
    /// Narration paused or resumed along with the session
    Paused,
    Resumed,
    Ambient { action: AmbientAction },
    Completed,
    Abandoned,
}

/// Background track control for remote players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbientAction {
    Play,
    Pause,
    Stop,
}

/// Human-readable terminal output
#[derive(Debug, Default)]
pub struct TerminalPresenter {
    no_color: bool,
}

impl TerminalPresenter {
    pub fn new(no_color: bool) -> Self {
        Self { no_color }
    }
}

impl PresentationSink for TerminalPresenter {
    fn on_phase_changed(&mut self, label: &str, target: PhaseTarget) {
        let hint = match target {
            PhaseTarget::Countdown { secs } => format!("{}s", secs),
            PhaseTarget::Hold { secs } => format!("hold {}s", secs),
            PhaseTarget::Signal => "listen".to_string(),
        };
        if self.no_color {
            println!("== {} ({})", label, hint);
        } else {
            println!("{} {} {}", "▶".bold(), label.bold(), format!("({})", hint).dimmed());
        }
    }

    fn on_tick(&mut self, _phase_elapsed: f64, _total_elapsed: f64) {}

    fn on_completed(&mut self) {
        if self.no_color {
            println!("== Completed");
        } else {
            println!("{}", "✅ Completed! Great job.".green().bold());
        }
    }

    fn on_abandoned(&mut self) {
        if self.no_color {
            println!("== Abandoned");
        } else {
            println!("{}", "Session ended early.".red());
        }
    }

    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.status.is_terminal()
            || matches!(
                snapshot.reason,
                ReasonCode::R001_TICK_IGNORED_PAUSED | ReasonCode::R001_TICK_IGNORED_TERMINAL
            )
        {
            return;
        }
        if self.no_color {
            println!("{}", snapshot.to_parseable_string());
        } else {
            println!("{}", snapshot.to_terminal_string());
        }
    }
}

/// One JSON object per line
#[derive(Debug)]
pub struct JsonLinesPresenter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, update: &SessionUpdate) {
        let written = serde_json::to_writer(&mut self.out, update)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        if let Err(err) = written {
            warn!(error = %err, "failed to write session update");
        }
    }
}

impl<W: Write> PresentationSink for JsonLinesPresenter<W> {
    fn on_phase_changed(&mut self, label: &str, target: PhaseTarget) {
        self.emit(&SessionUpdate::PhaseChanged { label: label.to_string(), target });
    }

    fn on_tick(&mut self, phase_elapsed: f64, total_elapsed: f64) {
        self.emit(&SessionUpdate::Tick { phase_elapsed, total_elapsed });
    }

    fn on_completed(&mut self) {
        self.emit(&SessionUpdate::Completed);
    }

    fn on_abandoned(&mut self) {
        self.emit(&SessionUpdate::Abandoned);
    }

    fn on_cue(&mut self, id: UtteranceId, text: &str) {
        self.emit(&SessionUpdate::Cue { utterance: id, text: text.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines() {
        let mut presenter = JsonLinesPresenter::new(Vec::new());
        presenter.on_phase_changed("Breathe In", PhaseTarget::Countdown { secs: 5.0 });
        presenter.on_tick(1.0, 1.0);
        presenter.on_completed();

        let out = String::from_utf8(presenter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: SessionUpdate = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first,
            SessionUpdate::PhaseChanged {
                label: "Breathe In".into(),
                target: PhaseTarget::Countdown { secs: 5.0 },
            }
        );
        assert_eq!(lines[2], r#"{"type":"completed"}"#);
    }

    #[test]
    fn test_update_tags() {
        let json = serde_json::to_string(&SessionUpdate::Cue {
            utterance: UtteranceId(3),
            text: "Breathe Out".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"cue","utterance":3,"text":"Breathe Out"}"#);
    }
}
