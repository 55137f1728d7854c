//! Core modules for Pacer

pub mod clock;
pub mod machine;
pub mod cue;
pub mod presenter;
pub mod controller;
pub mod runner;
pub mod posture;
pub mod presets;
pub mod api;

pub use clock::{Clock, FrameTimer, ManualClock, SystemClock, Tick, Ticker};
pub use machine::{SessionMachine, StepReport};
pub use cue::{AmbientAudio, CueDispatcher, CueSink, SilentNarrator, TerminalAmbient, TerminalNarrator, UtteranceId};
pub use presenter::{AmbientAction, JsonLinesPresenter, PresentationSink, SessionUpdate, TerminalPresenter};
pub use controller::SessionController;
pub use runner::{run_session, ticker_for, Command};
pub use posture::{head_tilt_ratio, Landmark, SampleProvider, ScriptedSamples};
pub use api::{create_router, create_router_with_clock, create_router_with_state, run_server, AppState};
