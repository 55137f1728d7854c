//! Cue dispatch: narration and background audio
//!
//! Best effort. A failed cue is logged and dropped; it never changes
//! session state. One utterance is active at a time: speaking cancels
//! whatever was in flight.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::CueError;
use crate::types::Cue;

/// Handle for a spoken cue, echoed back when it finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Narration output (speech engine, terminal, websocket client)
///
/// Completion is reported asynchronously by sending the id on whatever
/// channel the implementation was built with.
pub trait CueSink {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), CueError>;
    fn cancel(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

impl<T: CueSink + ?Sized> CueSink for Box<T> {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), CueError> {
        (**self).speak(id, text)
    }
    fn cancel(&mut self) {
        (**self).cancel()
    }
    fn pause(&mut self) {
        (**self).pause()
    }
    fn resume(&mut self) {
        (**self).resume()
    }
}

/// Looping background track
pub trait AmbientAudio: Send {
    fn play(&mut self) -> Result<(), CueError>;
    fn pause(&mut self);
    /// Pause and rewind
    fn stop(&mut self);
}

/// Wraps a `CueSink` with cancel-then-speak and failure swallowing
pub struct CueDispatcher<C: CueSink> {
    sink: C,
    ambient: Option<Box<dyn AmbientAudio>>,
    next_id: u64,
    active: Option<UtteranceId>,
}

impl<C: CueSink> CueDispatcher<C> {
    pub fn new(sink: C) -> Self {
        Self {
            sink,
            ambient: None,
            next_id: 0,
            active: None,
        }
    }

    pub fn with_ambient(mut self, ambient: Box<dyn AmbientAudio>) -> Self {
        self.ambient = Some(ambient);
        self
    }

    /// Speak a cue, superseding any active one. `None` if the sink refused.
    pub fn speak(&mut self, cue: &Cue) -> Option<UtteranceId> {
        if let Some(previous) = self.active.take() {
            debug!(%previous, "cancelling active utterance");
            self.sink.cancel();
        }

        self.next_id += 1;
        let id = UtteranceId(self.next_id);
        match self.sink.speak(id, &cue.text) {
            Ok(()) => {
                self.active = Some(id);
                Some(id)
            }
            Err(err) => {
                warn!(error = %err, text = %cue.text, "cue dropped");
                None
            }
        }
    }

    /// Mark an utterance done. Stale ids are ignored.
    pub fn finished(&mut self, id: UtteranceId) {
        if self.active == Some(id) {
            self.active = None;
        }
    }

    pub fn active(&self) -> Option<UtteranceId> {
        self.active
    }

    pub fn cancel(&mut self) {
        if self.active.take().is_some() {
            self.sink.cancel();
        }
    }

    pub fn pause(&mut self) {
        self.sink.pause();
        if let Some(ambient) = self.ambient.as_mut() {
            ambient.pause();
        }
    }

    pub fn resume(&mut self) {
        self.sink.resume();
        self.play_ambient();
    }

    pub fn play_ambient(&mut self) {
        if let Some(ambient) = self.ambient.as_mut() {
            if let Err(err) = ambient.play() {
                warn!(error = %err, "ambient audio failed to play");
            }
        }
    }

    pub fn stop_ambient(&mut self) {
        if let Some(ambient) = self.ambient.as_mut() {
            ambient.stop();
        }
    }

    /// Cancel narration and stop background audio
    pub fn shutdown(&mut self) {
        self.cancel();
        self.stop_ambient();
    }

    pub fn sink(&self) -> &C {
        &self.sink
    }
}

/// Prints cues to the terminal and reports them finished right away
#[derive(Debug)]
pub struct TerminalNarrator {
    done: mpsc::UnboundedSender<UtteranceId>,
    color: bool,
}

impl TerminalNarrator {
    pub fn new(done: mpsc::UnboundedSender<UtteranceId>, color: bool) -> Self {
        Self { done, color }
    }
}

impl CueSink for TerminalNarrator {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), CueError> {
        if self.color {
            println!("{}", format!("  🔊 {}", text).italic().bright_blue());
        } else {
            println!("  > {}", text);
        }
        self.done
            .send(id)
            .map_err(|_| CueError::Unavailable("completion channel closed".into()))
    }

    fn cancel(&mut self) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
}

/// Stands in for a background track in the terminal: reports state changes
#[derive(Debug)]
pub struct TerminalAmbient {
    color: bool,
    playing: bool,
}

impl TerminalAmbient {
    pub fn new(color: bool) -> Self {
        Self { color, playing: false }
    }

    fn show(&self, state: &str) {
        if self.color {
            println!("{}", format!("  ♪ ambient {}", state).dimmed());
        } else {
            println!("  ~ ambient {}", state);
        }
    }
}

impl AmbientAudio for TerminalAmbient {
    fn play(&mut self) -> Result<(), CueError> {
        if !self.playing {
            self.playing = true;
            self.show("playing");
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing {
            self.playing = false;
            self.show("paused");
        }
    }

    fn stop(&mut self) {
        self.playing = false;
        self.show("stopped");
    }
}

/// Says nothing; every cue completes immediately
#[derive(Debug)]
pub struct SilentNarrator {
    done: mpsc::UnboundedSender<UtteranceId>,
}

impl SilentNarrator {
    pub fn new(done: mpsc::UnboundedSender<UtteranceId>) -> Self {
        Self { done }
    }
}

impl CueSink for SilentNarrator {
    fn speak(&mut self, id: UtteranceId, _text: &str) -> Result<(), CueError> {
        let _ = self.done.send(id);
        Ok(())
    }

    fn cancel(&mut self) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
}
