//! # Rhythmicon
//!
//! Rhythmicon is the rhythm engine of a small hardware-style MIDI step
//! sequencer: a bank of clock dividers driven by a 24-PPQN master pulse
//! advances per-track step sequencers, quantizes each step to a musical
//! scale, and emits gated MIDI note events, synchronized to an internal
//! tempo or an external MIDI clock, with transport control (start, stop,
//! continue) applied safely against the running tick loop.
//!
//! ## Modules
//!
//! - `engine`: The real-time core: clock dividers, track sequencers, the
//!   tempo source, the `RhythmEngine` state machine, and the threaded
//!   `EngineHandle` that paces ticks and serializes transport commands.
//! - `midi`: The MIDI boundary: the `NoteSink` emission seam, a
//!   midir-backed output thread, and input decoding for transport and
//!   note events.
//! - `types`: Musical scale tables and the pitch quantizer.

pub mod engine;
pub mod midi;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use crate::engine::{
    EngineCommand, EngineHandle, RhythmEngine, StepMode, TempoSource, Transport,
};
pub use crate::midi::{MidiOutputHandle, NoteEvent, NoteSink, TransportEvent};
pub use crate::types::{quantize, Scale};
