//! Per-track step sequencer.
//!
//! A track owns a fixed-length buffer of signed semitone offsets and walks
//! it under one of five step modes when its assigned clock dividers fire.
//! Notes are quantized to the track's scale before emission, and a gate
//! countdown forces note-off so at most one note sounds per track.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::engine::DEFAULT_VELOCITY;
use crate::midi::NoteSink;
use crate::types::{quantize, Scale};

/// Traversal policy over the step buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMode {
    Forward,
    Backward,
    PingPong,
    RandomWalk,
    Random,
}

impl StepMode {
    /// All modes in menu order.
    pub const ALL: [StepMode; 5] = [
        StepMode::Forward,
        StepMode::Backward,
        StepMode::PingPong,
        StepMode::RandomWalk,
        StepMode::Random,
    ];

    /// Look up a mode by menu ordinal, clamped to the table.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepMode::Forward => "Forward",
            StepMode::Backward => "Backward",
            StepMode::PingPong => "Ping-Pong",
            StepMode::RandomWalk => "Random Walk",
            StepMode::Random => "Random",
        }
    }
}

/// Ping-pong traversal direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PingState {
    Forward,
    Backward,
}

pub struct TrackSequencer {
    /// Note offsets from the root, one per step.
    steps: Vec<i8>,
    /// Current play position, always within the step buffer.
    index: usize,
    step_mode: StepMode,
    ping: PingState,
    /// Root note; step offsets are relative to this.
    root: u8,
    /// Signed offset supplied by live MIDI input.
    external_offset: i16,
    scale: Scale,
    input_channel: u8,
    output_channel: u8,
    /// Last note-on we emitted, kept for the matching note-off.
    last_note: Option<u8>,
    /// Master pulses until the forced note-off.
    gate_remaining: u32,
}

impl TrackSequencer {
    /// Create a track with `length` steps, all zero offsets. A zero-length
    /// buffer is a configuration-time contract violation.
    pub fn new(length: usize) -> Self {
        assert!(length >= 1, "track needs at least one step");
        Self {
            steps: vec![0; length],
            index: 0,
            step_mode: StepMode::Forward,
            ping: PingState::Forward,
            root: 60,
            external_offset: 0,
            scale: Scale::Chromatic,
            input_channel: 1,
            output_channel: 1,
            last_note: None,
            gate_remaining: 0,
        }
    }

    /// Clock fire from the rhythm generators. Called at most once per
    /// master pulse; the engine de-duplicates simultaneous divider fires.
    ///
    /// `gate_pulses` is the gate length derived from the fastest divider
    /// assigned to this track.
    pub fn on_clock_fire(
        &mut self,
        gate_pulses: u32,
        rng: &mut SmallRng,
        sink: &mut dyn NoteSink,
    ) {
        // A still-sounding note means a re-trigger from a slower divider
        // overlapped the gate; close it before the new note-on.
        self.force_note_off(sink);
        self.advance_index(rng);

        let raw = self.steps[self.index] as i16 + self.external_offset;
        let note = quantize(raw, self.scale, self.root);
        sink.note_on(self.output_channel, note, DEFAULT_VELOCITY);
        self.last_note = Some(note);
        self.gate_remaining = gate_pulses;
    }

    /// Gate countdown, called every master pulse regardless of transport
    /// state so a pending note-off is never skipped.
    pub fn tick_gate(&mut self, sink: &mut dyn NoteSink) {
        if self.gate_remaining == 0 {
            return;
        }
        self.gate_remaining -= 1;
        if self.gate_remaining == 0 {
            if let Some(note) = self.last_note {
                sink.note_off(self.output_channel, note);
            }
        }
    }

    /// Note-off immediately if a note is sounding.
    pub fn force_note_off(&mut self, sink: &mut dyn NoteSink) {
        if self.gate_remaining > 0 {
            if let Some(note) = self.last_note {
                sink.note_off(self.output_channel, note);
            }
            self.gate_remaining = 0;
        }
    }

    /// Rewind to the first step for a transport sync.
    pub fn reset_position(&mut self) {
        self.index = 0;
        self.ping = PingState::Forward;
    }

    fn advance_index(&mut self, rng: &mut SmallRng) {
        let len = self.steps.len();
        match self.step_mode {
            StepMode::Forward => {
                self.index = (self.index + 1) % len;
            }
            StepMode::Backward => {
                self.index = (self.index + len - 1) % len;
            }
            StepMode::PingPong => match self.ping {
                // The endpoint step fires once more on the reversing fire,
                // so neither end is ever skipped.
                PingState::Forward => {
                    if self.index >= len - 1 {
                        self.ping = PingState::Backward;
                    } else {
                        self.index += 1;
                    }
                }
                PingState::Backward => {
                    if self.index == 0 {
                        self.ping = PingState::Forward;
                    } else {
                        self.index -= 1;
                    }
                }
            },
            StepMode::RandomWalk => {
                let step = rng.gen_range(-1i32..=1);
                self.index = (self.index as i32 + step).clamp(0, len as i32 - 1) as usize;
            }
            StepMode::Random => {
                self.index = rng.gen_range(0..len);
            }
        }
    }

    // --- configuration, clamped to documented ranges ---

    pub fn set_root(&mut self, root: u8) {
        self.root = root.min(127);
    }

    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    pub fn set_step_mode(&mut self, mode: StepMode) {
        self.step_mode = mode;
    }

    pub fn set_step(&mut self, step: usize, offset: i8) {
        if let Some(slot) = self.steps.get_mut(step) {
            *slot = offset;
        }
    }

    pub fn set_external_offset(&mut self, offset: i16) {
        self.external_offset = offset;
    }

    pub fn set_input_channel(&mut self, channel: u8) {
        self.input_channel = channel.clamp(1, 16);
    }

    pub fn set_output_channel(&mut self, channel: u8) {
        self.output_channel = channel.clamp(1, 16);
    }

    // --- read-only telemetry for display layers ---

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn last_note(&self) -> Option<u8> {
        self.last_note
    }

    pub fn is_sounding(&self) -> bool {
        self.gate_remaining > 0
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, step: usize) -> Option<i8> {
        self.steps.get(step).copied()
    }

    pub fn root(&self) -> u8 {
        self.root
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    pub fn input_channel(&self) -> u8 {
        self.input_channel
    }

    pub fn output_channel(&self) -> u8 {
        self.output_channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::NoteEvent;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0x5EED)
    }

    fn fire(track: &mut TrackSequencer, sink: &mut Vec<NoteEvent>) {
        track.on_clock_fire(4, &mut rng(), sink);
    }

    #[test]
    fn test_forward_wraps() {
        let mut track = TrackSequencer::new(4);
        let mut sink = Vec::new();
        let mut seen = Vec::new();
        for _ in 0..6 {
            fire(&mut track, &mut sink);
            seen.push(track.index());
        }
        assert_eq!(seen, vec![1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn test_backward_wraps() {
        let mut track = TrackSequencer::new(4);
        track.set_step_mode(StepMode::Backward);
        let mut sink = Vec::new();
        let mut seen = Vec::new();
        for _ in 0..6 {
            fire(&mut track, &mut sink);
            seen.push(track.index());
        }
        assert_eq!(seen, vec![3, 2, 1, 0, 3, 2]);
    }

    #[test]
    fn test_pingpong_endpoint_trace() {
        // Starting from index 0 the full trace is 0,1,2,3,3,2,1,0,0,1,...:
        // each endpoint fires once more on the reversing fire.
        let mut track = TrackSequencer::new(4);
        track.set_step_mode(StepMode::PingPong);
        let mut sink = Vec::new();
        let mut trace = vec![track.index()];
        for _ in 0..9 {
            fire(&mut track, &mut sink);
            trace.push(track.index());
        }
        assert_eq!(trace, vec![0, 1, 2, 3, 3, 2, 1, 0, 0, 1]);
    }

    #[test]
    fn test_pingpong_single_step() {
        let mut track = TrackSequencer::new(1);
        track.set_step_mode(StepMode::PingPong);
        let mut sink = Vec::new();
        for _ in 0..5 {
            fire(&mut track, &mut sink);
            assert_eq!(track.index(), 0);
        }
    }

    #[test]
    fn test_random_modes_stay_in_bounds() {
        for mode in [StepMode::RandomWalk, StepMode::Random] {
            let mut track = TrackSequencer::new(4);
            track.set_step_mode(mode);
            let mut sink = Vec::new();
            let mut walk_rng = SmallRng::seed_from_u64(42);
            for _ in 0..500 {
                track.on_clock_fire(4, &mut walk_rng, &mut sink);
                assert!(track.index() < 4, "{:?} escaped the buffer", mode);
            }
        }
    }

    #[test]
    fn test_random_walk_moves_at_most_one_step() {
        let mut track = TrackSequencer::new(8);
        track.set_step_mode(StepMode::RandomWalk);
        let mut sink = Vec::new();
        let mut walk_rng = SmallRng::seed_from_u64(7);
        let mut previous = track.index() as i32;
        for _ in 0..200 {
            track.on_clock_fire(4, &mut walk_rng, &mut sink);
            let current = track.index() as i32;
            assert!((current - previous).abs() <= 1);
            previous = current;
        }
    }

    #[test]
    fn test_retrigger_closes_sounding_note_first() {
        let mut track = TrackSequencer::new(4);
        let mut sink = Vec::new();
        fire(&mut track, &mut sink);
        let first = track.last_note().unwrap();
        // Second fire arrives while the first gate is still open.
        fire(&mut track, &mut sink);
        let second = track.last_note().unwrap();
        assert_eq!(
            sink,
            vec![
                NoteEvent::On {
                    channel: 1,
                    note: first,
                    velocity: DEFAULT_VELOCITY
                },
                NoteEvent::Off {
                    channel: 1,
                    note: first
                },
                NoteEvent::On {
                    channel: 1,
                    note: second,
                    velocity: DEFAULT_VELOCITY
                },
            ]
        );
    }

    #[test]
    fn test_gate_countdown_emits_note_off() {
        let mut track = TrackSequencer::new(4);
        let mut sink = Vec::new();
        track.on_clock_fire(3, &mut rng(), &mut sink);
        let note = track.last_note().unwrap();
        sink.clear();

        track.tick_gate(&mut sink);
        track.tick_gate(&mut sink);
        assert!(sink.is_empty());
        assert!(track.is_sounding());

        track.tick_gate(&mut sink);
        assert_eq!(
            sink,
            vec![NoteEvent::Off {
                channel: 1,
                note
            }]
        );
        assert!(!track.is_sounding());

        // Expired gate stays silent.
        sink.clear();
        track.tick_gate(&mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_force_note_off_only_when_sounding() {
        let mut track = TrackSequencer::new(4);
        let mut sink = Vec::new();
        track.force_note_off(&mut sink);
        assert!(sink.is_empty());

        fire(&mut track, &mut sink);
        sink.clear();
        track.force_note_off(&mut sink);
        assert_eq!(sink.len(), 1);

        // Already off; a second force is a no-op.
        sink.clear();
        track.force_note_off(&mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_quantized_note_uses_root_scale_and_offsets() {
        let mut track = TrackSequencer::new(4);
        track.set_root(60);
        track.set_scale(Scale::Major);
        track.set_step(1, 1); // C# offset, quantizes up to D
        track.set_output_channel(5);
        let mut sink = Vec::new();
        fire(&mut track, &mut sink);
        assert_eq!(
            sink[0],
            NoteEvent::On {
                channel: 5,
                note: 62,
                velocity: DEFAULT_VELOCITY
            }
        );
    }

    #[test]
    fn test_external_offset_shifts_pitch() {
        let mut track = TrackSequencer::new(4);
        track.set_scale(Scale::Chromatic);
        track.set_external_offset(7);
        let mut sink = Vec::new();
        fire(&mut track, &mut sink);
        assert_eq!(track.last_note(), Some(67));
    }

    #[test]
    fn test_configuration_clamps() {
        let mut track = TrackSequencer::new(4);
        track.set_input_channel(0);
        assert_eq!(track.input_channel(), 1);
        track.set_output_channel(99);
        assert_eq!(track.output_channel(), 16);
        track.set_root(200);
        assert_eq!(track.root(), 127);
        // Out-of-range step writes are dropped, not wrapped.
        track.set_step(99, 5);
        assert_eq!(track.step(99), None);
    }

    #[test]
    fn test_step_mode_from_index() {
        assert_eq!(StepMode::from_index(0), StepMode::Forward);
        assert_eq!(StepMode::from_index(4), StepMode::Random);
        assert_eq!(StepMode::from_index(42), StepMode::Random);
    }
}
