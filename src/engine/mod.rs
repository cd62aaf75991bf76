//! The real-time rhythm engine.
//!
//! A master pulse clock (24 PPQN) drives a bank of clock dividers; each
//! track advances its step sequencer when any of its assigned dividers
//! fires, quantizes the step against its scale, and emits gated MIDI
//! notes through a [`NoteSink`](crate::midi::NoteSink).
//!
//! The engine itself is single-threaded and synchronous: one owner calls
//! `tick()` at the pulse rate and applies transport/configuration changes
//! between ticks. [`handle::EngineHandle`] wraps it in a paced thread with
//! a command queue for asynchronous callers.

pub mod divider;
pub mod handle;
pub mod tempo;
pub mod track;

pub use divider::{ClockDivider, MAX_DIVIDER};
pub use handle::{EngineCommand, EngineHandle};
pub use tempo::{TempoSource, MAX_BPM, MIN_BPM};
pub use track::{StepMode, TrackSequencer};

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::midi::NoteSink;
use crate::types::Scale;

/// Master pulses per quarter note (MIDI clock standard).
pub const PULSES_PER_QUARTER: u32 = 24;

/// Master pulses per sub-pulse boundary: a divider ratio of 1 fires on
/// 16th notes.
pub const PULSES_PER_STEP: u32 = 6;

/// Rhythm generator slots.
pub const NUM_CLOCKS: usize = 4;

/// Sequencer tracks.
pub const NUM_TRACKS: usize = 3;

/// Steps per track.
pub const SEQ_STEPS: usize = 4;

/// Velocity for every emitted note-on.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Reference note for external MIDI note offsets.
pub const MIDDLE_C: u8 = 60;

/// Transport state shared by all tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Idle,
    Running,
}

pub struct RhythmEngine {
    transport: Transport,
    /// Sub-pulse ticks since the last sync. Divider phase never depends on
    /// this value, so wraparound is harmless.
    pulse: u64,
    dividers: [ClockDivider; NUM_CLOCKS],
    tracks: [TrackSequencer; NUM_TRACKS],
    /// `clock_sources[track][slot]`: whether the track is clocked by that
    /// rhythm generator.
    clock_sources: [[bool; NUM_CLOCKS]; NUM_TRACKS],
    rng: SmallRng,
}

impl RhythmEngine {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    /// Deterministic construction for tests of the random step modes.
    pub fn with_rng(rng: SmallRng) -> Self {
        let mut clock_sources = [[false; NUM_CLOCKS]; NUM_TRACKS];
        let mut tracks: [TrackSequencer; NUM_TRACKS] =
            std::array::from_fn(|_| TrackSequencer::new(SEQ_STEPS));
        // Default wiring: track N runs from rhythm generator N on its own
        // MIDI channel pair.
        for (n, track) in tracks.iter_mut().enumerate() {
            clock_sources[n][n.min(NUM_CLOCKS - 1)] = true;
            track.set_output_channel(n as u8 + 1);
            track.set_input_channel(n as u8 + 1);
        }
        Self {
            transport: Transport::Idle,
            pulse: 0,
            dividers: std::array::from_fn(|_| ClockDivider::new(1)),
            tracks,
            clock_sources,
            rng,
        }
    }

    /// One master pulse. Gate countdowns run unconditionally so a pending
    /// note-off is never skipped; sequencing only happens while running.
    pub fn tick(&mut self, sink: &mut dyn NoteSink) {
        for track in &mut self.tracks {
            track.tick_gate(sink);
        }
        if self.transport != Transport::Running {
            return;
        }
        self.pulse = self.pulse.wrapping_add(1);

        let mut fired = [false; NUM_CLOCKS];
        for (slot, divider) in self.dividers.iter_mut().enumerate() {
            fired[slot] = divider.advance();
        }

        for (track, sources) in self.tracks.iter_mut().zip(&self.clock_sources) {
            let clocked = sources
                .iter()
                .zip(&fired)
                .any(|(&assigned, &fire)| assigned && fire);
            if !clocked {
                continue;
            }
            // Gate length comes from the fastest assigned divider so a
            // trigger from a slow divider still gets a musically consistent
            // gate.
            let fastest = sources
                .iter()
                .zip(&self.dividers)
                .filter(|(&assigned, _)| assigned)
                .map(|(_, divider)| divider.ratio())
                .min()
                .unwrap_or(MAX_DIVIDER);
            let gate = fastest as u32 * PULSES_PER_QUARTER / PULSES_PER_STEP;
            track.on_clock_fire(gate, &mut self.rng, sink);
        }
    }

    /// Transport Start: silence everything, re-align all phases, run.
    pub fn start(&mut self, sink: &mut dyn NoteSink) {
        self.all_notes_off(sink);
        self.sync();
        self.transport = Transport::Running;
    }

    /// Transport Stop: silence everything, go idle. Idempotent.
    pub fn stop(&mut self, sink: &mut dyn NoteSink) {
        self.all_notes_off(sink);
        self.transport = Transport::Idle;
    }

    /// Transport Continue: resume in place, no phase reset.
    pub fn continue_from(&mut self) {
        self.transport = Transport::Running;
    }

    /// Note-off for every sounding track.
    pub fn all_notes_off(&mut self, sink: &mut dyn NoteSink) {
        for track in &mut self.tracks {
            track.force_note_off(sink);
        }
    }

    /// Reset the pulse counter, every divider phase, and every track
    /// position so all sequencers run in lockstep again.
    fn sync(&mut self) {
        self.pulse = 0;
        for divider in &mut self.dividers {
            divider.reset();
        }
        for track in &mut self.tracks {
            track.reset_position();
        }
    }

    /// Live MIDI note input: becomes the signed external offset of every
    /// track listening on `channel`.
    pub fn note_input(&mut self, channel: u8, note: u8) {
        let offset = note as i16 - MIDDLE_C as i16;
        for track in &mut self.tracks {
            if track.input_channel() == channel {
                track.set_external_offset(offset);
            }
        }
    }

    // --- configuration surface for the parameter collaborator ---
    // Runtime fields (index, gate, last note) stay engine-private; these
    // setters clamp and ignore out-of-range track/slot indices.

    pub fn set_track_root(&mut self, track: usize, root: u8) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.set_root(root);
        }
    }

    pub fn set_track_scale(&mut self, track: usize, scale: Scale) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.set_scale(scale);
        }
    }

    pub fn set_track_step_mode(&mut self, track: usize, mode: StepMode) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.set_step_mode(mode);
        }
    }

    pub fn set_track_step(&mut self, track: usize, step: usize, offset: i8) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.set_step(step, offset);
        }
    }

    pub fn set_track_output_channel(&mut self, track: usize, channel: u8) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.set_output_channel(channel);
        }
    }

    pub fn set_track_input_channel(&mut self, track: usize, channel: u8) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.set_input_channel(channel);
        }
    }

    pub fn set_divider_ratio(&mut self, slot: usize, ratio: u16) {
        if let Some(d) = self.dividers.get_mut(slot) {
            d.set_ratio(ratio);
        }
    }

    /// Wire or unwire a rhythm generator as a clock source for a track. A
    /// track with no sources never advances; that is a valid muted state.
    pub fn set_clock_source(&mut self, track: usize, slot: usize, enabled: bool) {
        if track < NUM_TRACKS && slot < NUM_CLOCKS {
            self.clock_sources[track][slot] = enabled;
        }
    }

    // --- read-only telemetry ---

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn pulse(&self) -> u64 {
        self.pulse
    }

    pub fn divider_ratio(&self, slot: usize) -> u16 {
        self.dividers.get(slot).map(ClockDivider::ratio).unwrap_or(1)
    }

    pub fn track(&self, track: usize) -> Option<&TrackSequencer> {
        self.tracks.get(track)
    }

    pub fn track_index(&self, track: usize) -> usize {
        self.tracks.get(track).map(TrackSequencer::index).unwrap_or(0)
    }

    pub fn track_last_note(&self, track: usize) -> Option<u8> {
        self.tracks.get(track).and_then(TrackSequencer::last_note)
    }
}

impl Default for RhythmEngine {
    fn default() -> Self {
        Self::new()
    }
}
