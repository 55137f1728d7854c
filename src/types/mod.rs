//! Core types for Pacer

mod state;
mod phase;
mod table;
mod event;
mod output;
mod reason;

pub use state::{SessionState, SessionStatus};
pub use phase::{Advance, Cue, PhaseDescriptor, Reminder, SampleCondition};
pub use table::{tick_interval, Cadence, PhaseTable, TableSpec};
pub use event::{PhaseTarget, SessionEvent};
pub use output::{format_clock, SessionSnapshot};
pub use reason::ReasonCode;
