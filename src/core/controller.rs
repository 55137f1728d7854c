//! Session controller: machine + clock + sinks
//!
//! Owns one `SessionMachine` and fans its events out to the presentation
//! and cue sinks. Also implements the narration gate: a gate phase entered
//! with a cue opens when that utterance reports completion.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::clock::{Clock, FrameTimer};
use crate::core::cue::{CueDispatcher, CueSink, UtteranceId};
use crate::core::machine::{SessionMachine, StepReport};
use crate::core::presenter::PresentationSink;
use crate::error::SessionError;
use crate::types::{Cadence, PhaseTable, ReasonCode, SessionEvent, SessionSnapshot, SessionStatus};

pub struct SessionController<P: PresentationSink, C: CueSink> {
    machine: SessionMachine,
    presenter: P,
    cues: CueDispatcher<C>,
    clock: Arc<dyn Clock>,
    frames: FrameTimer,
    /// Utterance the current gate phase is waiting on
    gate_utterance: Option<UtteranceId>,
    /// Sample held for the next fixed-cadence tick
    pending_sample: Option<f64>,
    last_reason: ReasonCode,
}

impl<P: PresentationSink, C: CueSink> SessionController<P, C> {
    pub fn new(table: PhaseTable, presenter: P, cues: CueDispatcher<C>, clock: Arc<dyn Clock>) -> Self {
        Self {
            machine: SessionMachine::new(table),
            presenter,
            cues,
            clock,
            frames: FrameTimer::new(),
            gate_utterance: None,
            pending_sample: None,
            last_reason: ReasonCode::R001_TICK_IGNORED_NOT_STARTED,
        }
    }

    pub fn start(&mut self) -> Result<ReasonCode, SessionError> {
        let report = self.machine.start()?;
        if self.machine.table().ambient() {
            self.cues.play_ambient();
        }
        Ok(self.apply(report))
    }

    /// Fixed-cadence tick; consumes any sample offered since the last tick
    pub fn tick(&mut self, delta_secs: f64) -> ReasonCode {
        let sample = self.pending_sample.take();
        let report = self.machine.on_tick(delta_secs, sample);
        self.apply(report)
    }

    /// Sensor frame: elapsed time comes from the clock, with the stall guard
    pub fn frame(&mut self, sample: Option<f64>) -> ReasonCode {
        let delta = self.frames.delta(self.clock.now());
        let report = self.machine.on_tick(delta, sample);
        self.apply(report)
    }

    /// Route a sample by cadence: frames tick immediately, fixed tables
    /// hold it for the next tick
    pub fn offer_sample(&mut self, sample: Option<f64>) -> Option<ReasonCode> {
        match self.machine.table().cadence() {
            Cadence::Frames => Some(self.frame(sample)),
            Cadence::Fixed { .. } => {
                self.pending_sample = sample;
                None
            }
        }
    }

    pub fn pause(&mut self) -> Result<ReasonCode, SessionError> {
        if self.machine.pause()? {
            self.cues.pause();
        }
        Ok(self.settle(ReasonCode::R004_PAUSED))
    }

    pub fn resume(&mut self) -> Result<ReasonCode, SessionError> {
        if self.machine.resume()? {
            self.cues.resume();
        }
        Ok(self.settle(ReasonCode::R004_RESUMED))
    }

    pub fn toggle_pause(&mut self) -> Result<ReasonCode, SessionError> {
        if self.machine.state().paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn skip(&mut self) -> Result<ReasonCode, SessionError> {
        let report = self.machine.skip()?;
        Ok(self.apply(report))
    }

    /// Open the current gate without waiting on narration
    pub fn open_gate(&mut self) -> Result<ReasonCode, SessionError> {
        self.gate_utterance = None;
        let report = self.machine.open_gate()?;
        Ok(self.apply(report))
    }

    /// Abandon: narration and audio are stopped before returning
    pub fn quit(&mut self) -> Result<ReasonCode, SessionError> {
        let report = self.machine.quit()?;
        Ok(self.apply(report))
    }

    /// Narration finished. Opens the gate if this was the utterance it waits on.
    pub fn cue_finished(&mut self, id: UtteranceId) -> Option<ReasonCode> {
        self.cues.finished(id);
        if self.gate_utterance != Some(id) {
            return None;
        }
        self.gate_utterance = None;
        if self.machine.status() != SessionStatus::Running {
            return None;
        }
        match self.machine.open_gate() {
            Ok(report) => Some(self.apply(report)),
            Err(err) => {
                debug!(error = %err, "gate signal ignored");
                None
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.machine.status()
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn cues(&self) -> &CueDispatcher<C> {
        &self.cues
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.machine.snapshot(self.last_reason)
    }

    fn settle(&mut self, reason: ReasonCode) -> ReasonCode {
        self.last_reason = reason;
        let snapshot = self.snapshot();
        self.presenter.on_snapshot(&snapshot);
        reason
    }

    /// Fan events out to sinks. A gate whose cue could not be spoken opens
    /// immediately, so those events are processed in the same pass.
    fn apply(&mut self, report: StepReport) -> ReasonCode {
        let mut reason = report.reason;
        let mut queue: VecDeque<SessionEvent> = report.events.into();

        while let Some(event) = queue.pop_front() {
            match event {
                SessionEvent::PhaseEntered { label, target, cue, gate, .. } => {
                    self.gate_utterance = None;
                    self.presenter.on_phase_changed(&label, target);
                    let spoken = cue.as_ref().and_then(|cue| self.speak(cue));
                    if gate {
                        match (cue.is_some(), spoken) {
                            (_, Some(id)) => self.gate_utterance = Some(id),
                            (true, None) => {
                                warn!(phase = %label, "gate cue not spoken, opening gate");
                                if let Ok(next) = self.machine.open_gate() {
                                    reason = next.reason;
                                    queue.extend(next.events);
                                }
                            }
                            // No cue: waits for an explicit open_gate()
                            (false, None) => {}
                        }
                    }
                }
                SessionEvent::Tick { phase_elapsed, total_elapsed } => {
                    self.presenter.on_tick(phase_elapsed, total_elapsed);
                }
                SessionEvent::Reminder { cue, .. } => {
                    self.speak(&cue);
                }
                SessionEvent::Completed { cue } => {
                    self.gate_utterance = None;
                    self.cues.stop_ambient();
                    match cue {
                        Some(cue) => {
                            self.speak(&cue);
                        }
                        None => self.cues.cancel(),
                    }
                    self.presenter.on_completed();
                }
                SessionEvent::Abandoned => {
                    self.gate_utterance = None;
                    self.cues.shutdown();
                    self.presenter.on_abandoned();
                }
            }
        }

        self.settle(reason)
    }

    fn speak(&mut self, cue: &crate::types::Cue) -> Option<UtteranceId> {
        let id = self.cues.speak(cue)?;
        self.presenter.on_cue(id, &cue.text);
        Some(id)
    }
}
