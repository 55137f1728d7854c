//! Session machine: phase-table-driven state machine
//!
//! Status transitions:
//! - NOT_STARTED → RUNNING: start()
//! - RUNNING → RUNNING: phase advance on time, condition, gate or skip
//! - RUNNING → COMPLETED: last phase done, or total limit reached
//! - NOT_STARTED | RUNNING → ABANDONED: quit()
//!
//! Paused ticks are ignored. Condition phases only credit time while the
//! sample satisfies the condition, and never drop earlier progress.

use tracing::{debug, info};

use crate::error::SessionError;
use crate::types::{
    Advance, PhaseDescriptor, PhaseTable, PhaseTarget, ReasonCode, SessionEvent, SessionSnapshot,
    SessionState, SessionStatus,
};
use crate::TIME_EPSILON;

/// Outcome of one tick or action
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub reason: ReasonCode,
    pub events: Vec<SessionEvent>,
}

impl StepReport {
    fn quiet(reason: ReasonCode) -> Self {
        Self { reason, events: Vec::new() }
    }
}

/// Owns the phase table and the only mutable copy of `SessionState`
#[derive(Debug, Clone)]
pub struct SessionMachine {
    table: PhaseTable,
    state: SessionState,
}

impl SessionMachine {
    pub fn new(table: PhaseTable) -> Self {
        Self {
            table,
            state: SessionState::new(),
        }
    }

    /// Enter the first phase
    pub fn start(&mut self) -> Result<StepReport, SessionError> {
        if self.state.status != SessionStatus::NotStarted {
            return Err(SessionError::AlreadyStarted(self.state.status));
        }
        self.state.status = SessionStatus::Running;
        info!(table = %self.table.name(), phases = self.table.len(), "session started");

        let mut events = Vec::new();
        self.enter_phase(&mut events, true);
        Ok(StepReport { reason: ReasonCode::R002_SESSION_STARTED, events })
    }

    /// Advance time by `delta_secs`, with the latest external sample if any
    pub fn on_tick(&mut self, delta_secs: f64, sample: Option<f64>) -> StepReport {
        match self.state.status {
            SessionStatus::NotStarted => {
                return StepReport::quiet(ReasonCode::R001_TICK_IGNORED_NOT_STARTED)
            }
            SessionStatus::Completed | SessionStatus::Abandoned => {
                return StepReport::quiet(ReasonCode::R001_TICK_IGNORED_TERMINAL)
            }
            SessionStatus::Running => {}
        }
        if self.state.paused {
            return StepReport::quiet(ReasonCode::R001_TICK_IGNORED_PAUSED);
        }

        let delta = if delta_secs.is_finite() && delta_secs > 0.0 { delta_secs } else { 0.0 };
        let index = self.state.phase_index;
        let Some(phase) = self.table.phase(index) else {
            // Exhausted tables complete on the transition itself; nothing to credit
            let mut events = Vec::new();
            self.complete(&mut events);
            return StepReport { reason: ReasonCode::R005_ALL_PHASES_DONE, events };
        };

        let (credit, mut reason) = match &phase.advance {
            Advance::Timer { .. } => (delta, ReasonCode::R002_TIMER_RUNNING),
            Advance::Condition { condition, .. } => {
                if condition.is_met(sample) {
                    (delta, ReasonCode::R003_CONDITION_MET)
                } else if sample.is_none() {
                    (0.0, ReasonCode::R003_SAMPLE_MISSING)
                } else {
                    (0.0, ReasonCode::R003_CONDITION_NOT_MET)
                }
            }
            Advance::Signal => (delta, ReasonCode::R002_AWAITING_SIGNAL),
        };

        let before = self.state.phase_elapsed;
        let after = before + credit;
        self.state.phase_elapsed = after;
        self.state.total_elapsed += delta;

        let mut events = Vec::new();
        for reminder in &phase.reminders {
            if before + TIME_EPSILON < reminder.at_secs && after + TIME_EPSILON >= reminder.at_secs {
                events.push(SessionEvent::Reminder { index, cue: reminder.cue.clone() });
            }
        }
        let finished = phase
            .duration_secs()
            .is_some_and(|duration| after + TIME_EPSILON >= duration);

        events.push(SessionEvent::Tick {
            phase_elapsed: self.state.phase_elapsed,
            total_elapsed: self.state.total_elapsed,
        });

        if self.limit_reached() {
            if finished {
                self.state.phases_completed += 1;
            }
            debug!(total = self.state.total_elapsed, "session limit reached");
            self.complete(&mut events);
            return StepReport { reason: ReasonCode::R005_TIME_LIMIT_REACHED, events };
        }

        if finished {
            self.state.phases_completed += 1;
            reason = self.advance(&mut events, ReasonCode::R004_PHASE_ADVANCED);
        }

        StepReport { reason, events }
    }

    /// Set the pause flag. Returns whether it changed.
    pub fn pause(&mut self) -> Result<bool, SessionError> {
        self.require_running()?;
        let changed = !self.state.paused;
        self.state.paused = true;
        Ok(changed)
    }

    /// Clear the pause flag. Paused time is never credited afterwards.
    pub fn resume(&mut self) -> Result<bool, SessionError> {
        self.require_running()?;
        let changed = self.state.paused;
        self.state.paused = false;
        Ok(changed)
    }

    /// Force the next phase, paused or not
    pub fn skip(&mut self) -> Result<StepReport, SessionError> {
        self.require_running()?;
        debug!(phase = self.state.phase_index, "phase skipped");
        let mut events = Vec::new();
        let reason = self.advance(&mut events, ReasonCode::R004_PHASE_SKIPPED);
        Ok(StepReport { reason, events })
    }

    /// Deliver the external signal a gate phase waits on
    pub fn open_gate(&mut self) -> Result<StepReport, SessionError> {
        self.require_running()?;
        match self.current_phase() {
            Some(phase) if phase.is_gate() => {}
            Some(phase) => return Err(SessionError::NotAGate(phase.name.clone())),
            None => return Err(SessionError::NotAGate(String::new())),
        }
        self.state.phases_completed += 1;
        let mut events = Vec::new();
        let reason = self.advance(&mut events, ReasonCode::R004_GATE_OPENED);
        Ok(StepReport { reason, events })
    }

    /// Abandon the session
    pub fn quit(&mut self) -> Result<StepReport, SessionError> {
        if self.state.status.is_terminal() {
            return Err(SessionError::NotRunning(self.state.status));
        }
        self.state.status = SessionStatus::Abandoned;
        info!(
            table = %self.table.name(),
            phase = self.state.phase_index,
            total = self.state.total_elapsed,
            "session abandoned"
        );
        Ok(StepReport {
            reason: ReasonCode::R005_ABANDONED,
            events: vec![SessionEvent::Abandoned],
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn current_phase(&self) -> Option<&PhaseDescriptor> {
        self.table.phase(self.state.phase_index)
    }

    /// Read-only copy for sinks
    pub fn snapshot(&self, reason: ReasonCode) -> SessionSnapshot {
        let phase = self.current_phase().filter(|_| !self.state.status.is_terminal());
        SessionSnapshot {
            timestamp: chrono::Utc::now(),
            table: self.table.name().to_string(),
            status: self.state.status,
            paused: self.state.paused,
            phase_index: self.state.phase_index,
            phase_name: phase.map(|p| p.name.clone()).unwrap_or_default(),
            label: phase.map(|p| p.label.clone()).unwrap_or_default(),
            target: phase.map(target_of),
            phase_elapsed: self.state.phase_elapsed,
            total_elapsed: self.state.total_elapsed,
            total_remaining: self
                .table
                .total_limit_secs()
                .map(|limit| (limit - self.state.total_elapsed).max(0.0)),
            cycle: self.table.cycle_of(self.state.phase_index) + 1,
            phases_completed: self.state.phases_completed,
            reason,
        }
    }

    fn require_running(&self) -> Result<(), SessionError> {
        if self.state.status == SessionStatus::Running {
            Ok(())
        } else {
            Err(SessionError::NotRunning(self.state.status))
        }
    }

    fn limit_reached(&self) -> bool {
        self.table
            .total_limit_secs()
            .is_some_and(|limit| self.state.total_elapsed + TIME_EPSILON >= limit)
    }

    /// Move to the next phase or complete. Returns `reason` or `ALL_PHASES_DONE`.
    fn advance(&mut self, events: &mut Vec<SessionEvent>, reason: ReasonCode) -> ReasonCode {
        self.state.phase_index += 1;
        self.state.phase_elapsed = 0.0;

        if self.table.phase(self.state.phase_index).is_none() {
            self.complete(events);
            return ReasonCode::R005_ALL_PHASES_DONE;
        }
        self.enter_phase(events, false);
        reason
    }

    fn enter_phase(&self, events: &mut Vec<SessionEvent>, opening: bool) {
        let index = self.state.phase_index;
        let Some(phase) = self.table.phase(index) else {
            return;
        };
        let cue = if opening {
            self.table.opening_cue().or(phase.on_enter.as_ref()).cloned()
        } else {
            phase.on_enter.clone()
        };
        debug!(index, phase = %phase.name, "phase entered");
        events.push(SessionEvent::PhaseEntered {
            index,
            name: phase.name.clone(),
            label: phase.label.clone(),
            target: target_of(phase),
            cue,
            gate: phase.is_gate(),
        });
    }

    fn complete(&mut self, events: &mut Vec<SessionEvent>) {
        self.state.status = SessionStatus::Completed;
        info!(
            table = %self.table.name(),
            phases_completed = self.state.phases_completed,
            total = self.state.total_elapsed,
            "session completed"
        );
        events.push(SessionEvent::Completed {
            cue: self.table.completion_cue().cloned(),
        });
    }
}

fn target_of(phase: &PhaseDescriptor) -> PhaseTarget {
    match phase.advance {
        Advance::Timer { duration_secs } => PhaseTarget::Countdown { secs: duration_secs },
        Advance::Condition { duration_secs, .. } => PhaseTarget::Hold { secs: duration_secs },
        Advance::Signal => PhaseTarget::Signal,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cue, SampleCondition, TableSpec};

    fn timed_table(durations: &[f64]) -> PhaseTable {
        let phases = durations
            .iter()
            .enumerate()
            .map(|(i, d)| PhaseDescriptor::timed(format!("P{}", i), format!("phase {}", i), *d))
            .collect();
        TableSpec::new("timed", phases).build().unwrap()
    }

    fn started(table: PhaseTable) -> SessionMachine {
        let mut machine = SessionMachine::new(table);
        machine.start().unwrap();
        machine
    }

    #[test]
    fn test_initial_state_is_not_started() {
        let machine = SessionMachine::new(timed_table(&[1.0]));
        assert_eq!(machine.status(), SessionStatus::NotStarted);
    }

    #[test]
    fn test_tick_before_start_is_ignored() {
        let mut machine = SessionMachine::new(timed_table(&[1.0]));
        let report = machine.on_tick(1.0, None);
        assert_eq!(report.reason, ReasonCode::R001_TICK_IGNORED_NOT_STARTED);
        assert_eq!(machine.state().total_elapsed, 0.0);
    }

    #[test]
    fn test_start_enters_first_phase() {
        let mut machine = SessionMachine::new(timed_table(&[2.0, 3.0]));
        let report = machine.start().unwrap();
        assert_eq!(report.reason, ReasonCode::R002_SESSION_STARTED);
        assert!(matches!(
            &report.events[0],
            SessionEvent::PhaseEntered { index: 0, name, .. } if name == "P0"
        ));
        assert!(matches!(machine.start(), Err(SessionError::AlreadyStarted(_))));
    }

    #[test]
    fn test_timed_phase_advances_on_duration() {
        let mut machine = started(timed_table(&[2.0, 3.0]));
        assert_eq!(machine.on_tick(1.0, None).reason, ReasonCode::R002_TIMER_RUNNING);
        let report = machine.on_tick(1.0, None);
        assert_eq!(report.reason, ReasonCode::R004_PHASE_ADVANCED);
        assert_eq!(machine.state().phase_index, 1);
        assert_eq!(machine.state().phase_elapsed, 0.0);
    }

    #[test]
    fn test_completes_after_last_phase() {
        let mut machine = started(timed_table(&[1.0, 1.0]));
        machine.on_tick(1.0, None);
        let report = machine.on_tick(1.0, None);
        assert_eq!(report.reason, ReasonCode::R005_ALL_PHASES_DONE);
        assert_eq!(machine.status(), SessionStatus::Completed);
        assert!(report.events.last().unwrap().is_terminal());

        // Terminal: further ticks do nothing
        let report = machine.on_tick(1.0, None);
        assert_eq!(report.reason, ReasonCode::R001_TICK_IGNORED_TERMINAL);
        assert!(report.events.is_empty());
        assert_eq!(machine.state().total_elapsed, 2.0);
    }

    #[test]
    fn test_paused_ticks_do_not_advance() {
        let mut machine = started(timed_table(&[2.0]));
        assert!(machine.pause().unwrap());
        assert!(!machine.pause().unwrap());
        let report = machine.on_tick(1.0, None);
        assert_eq!(report.reason, ReasonCode::R001_TICK_IGNORED_PAUSED);
        assert_eq!(machine.state().phase_elapsed, 0.0);
        assert_eq!(machine.state().total_elapsed, 0.0);

        assert!(machine.resume().unwrap());
        machine.on_tick(1.0, None);
        assert_eq!(machine.state().phase_elapsed, 1.0);
    }

    #[test]
    fn test_skip_resets_phase_elapsed_even_when_paused() {
        let mut machine = started(timed_table(&[5.0, 5.0, 5.0]));
        machine.on_tick(3.0, None);
        machine.pause().unwrap();
        let report = machine.skip().unwrap();
        assert_eq!(report.reason, ReasonCode::R004_PHASE_SKIPPED);
        assert_eq!(machine.state().phase_index, 1);
        assert_eq!(machine.state().phase_elapsed, 0.0);
        assert_eq!(machine.state().phases_completed, 0);
        assert!(machine.state().paused);
    }

    #[test]
    fn test_skip_past_last_phase_completes() {
        let mut machine = started(timed_table(&[5.0]));
        let report = machine.skip().unwrap();
        assert_eq!(report.reason, ReasonCode::R005_ALL_PHASES_DONE);
        assert_eq!(machine.status(), SessionStatus::Completed);
        assert!(matches!(machine.skip(), Err(SessionError::NotRunning(SessionStatus::Completed))));
    }

    #[test]
    fn test_skip_before_start_rejected() {
        let mut machine = SessionMachine::new(timed_table(&[5.0]));
        assert!(matches!(machine.skip(), Err(SessionError::NotRunning(SessionStatus::NotStarted))));
    }

    #[test]
    fn test_quit_is_terminal() {
        let mut machine = started(timed_table(&[5.0]));
        let report = machine.quit().unwrap();
        assert_eq!(report.events, vec![SessionEvent::Abandoned]);
        assert_eq!(machine.status(), SessionStatus::Abandoned);
        assert!(machine.quit().is_err());
        assert!(machine.pause().is_err());
        assert_eq!(machine.on_tick(1.0, None).reason, ReasonCode::R001_TICK_IGNORED_TERMINAL);
    }

    #[test]
    fn test_condition_progress_survives_failed_checks() {
        let phase = PhaseDescriptor::held("HOLD", "hold", 3.0, SampleCondition::Below { threshold: 0.35 });
        let mut machine = started(TableSpec::new("cond", vec![phase]).build().unwrap());

        machine.on_tick(1.0, Some(0.30));
        machine.on_tick(1.0, Some(0.30));
        let report = machine.on_tick(1.0, Some(0.50));
        assert_eq!(report.reason, ReasonCode::R003_CONDITION_NOT_MET);
        assert_eq!(machine.state().phase_elapsed, 2.0);

        let report = machine.on_tick(1.0, None);
        assert_eq!(report.reason, ReasonCode::R003_SAMPLE_MISSING);
        assert_eq!(machine.state().phase_elapsed, 2.0);
        assert_eq!(machine.state().total_elapsed, 4.0);

        let report = machine.on_tick(1.0, Some(0.10));
        assert_eq!(report.reason, ReasonCode::R005_ALL_PHASES_DONE);
    }

    #[test]
    fn test_gate_waits_for_signal() {
        let spec = TableSpec::new(
            "gated",
            vec![
                PhaseDescriptor::gate("GUIDE", "Close your eyes").with_cue("Calm yourself"),
                PhaseDescriptor::timed("TIMER", "Breathe", 2.0),
            ],
        );
        let mut machine = started(spec.build().unwrap());
        for _ in 0..10 {
            assert_eq!(machine.on_tick(1.0, None).reason, ReasonCode::R002_AWAITING_SIGNAL);
        }
        assert_eq!(machine.state().phase_index, 0);

        let report = machine.open_gate().unwrap();
        assert_eq!(report.reason, ReasonCode::R004_GATE_OPENED);
        assert_eq!(machine.state().phase_index, 1);
        assert!(matches!(machine.open_gate(), Err(SessionError::NotAGate(name)) if name == "TIMER"));
    }

    #[test]
    fn test_total_limit_cuts_phase_short() {
        let mut spec = TableSpec::new(
            "limited",
            vec![PhaseDescriptor::timed("A", "a", 100.0), PhaseDescriptor::timed("B", "b", 100.0)],
        );
        spec.total_limit_secs = Some(180.0);
        let mut machine = started(spec.build().unwrap());

        let mut ticks = 0;
        while machine.status() == SessionStatus::Running {
            machine.on_tick(1.0, None);
            ticks += 1;
        }
        assert_eq!(ticks, 180);
        assert_eq!(machine.state().phase_index, 1);
        assert_eq!(machine.state().phase_elapsed, 80.0);
        assert_eq!(machine.state().phases_completed, 1);
    }

    #[test]
    fn test_reminder_fires_once() {
        let phase = PhaseDescriptor::timed("TIMER", "t", 6.0).with_reminder(3.0, "Stay focused");
        let mut machine = started(TableSpec::new("r", vec![phase]).build().unwrap());
        let mut reminders = 0;
        for _ in 0..5 {
            reminders += machine
                .on_tick(1.0, None)
                .events
                .iter()
                .filter(|e| matches!(e, SessionEvent::Reminder { cue, .. } if *cue == Cue::new("Stay focused")))
                .count();
        }
        assert_eq!(reminders, 1);
    }

    #[test]
    fn test_opening_cue_replaces_first_cue() {
        let mut spec = TableSpec::new("o", vec![PhaseDescriptor::timed("A", "a", 1.0).with_cue("plain")]);
        spec.opening_cue = Some(Cue::new("opening"));
        let mut machine = SessionMachine::new(spec.build().unwrap());
        let report = machine.start().unwrap();
        assert!(matches!(
            &report.events[0],
            SessionEvent::PhaseEntered { cue: Some(cue), .. } if cue.text == "opening"
        ));
    }

    #[test]
    fn test_bad_delta_credits_nothing() {
        let mut machine = started(timed_table(&[2.0]));
        machine.on_tick(f64::NAN, None);
        machine.on_tick(-4.0, None);
        assert_eq!(machine.state().total_elapsed, 0.0);
    }

    #[test]
    fn test_snapshot_after_completion_has_no_phase() {
        let mut machine = started(timed_table(&[1.0]));
        machine.on_tick(1.0, None);
        let snap = machine.snapshot(ReasonCode::R005_ALL_PHASES_DONE);
        assert_eq!(snap.status, SessionStatus::Completed);
        assert!(snap.phase_name.is_empty());
        assert!(snap.target.is_none());
    }
}
