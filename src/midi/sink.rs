//! The note-emission seam between the rhythm engine and the MIDI transport.
//!
//! The engine never talks to a MIDI device directly; it emits note on/off
//! calls through `NoteSink`. The midir-backed output handle implements it
//! for real hardware, and a plain `Vec<NoteEvent>` implements it so tests
//! can assert on the exact emitted event order.

/// Accepts timed note events from the engine.
///
/// Channels are 1-16 (MIDI convention as printed on hardware); note and
/// velocity are 0-127. Implementations must not block: the engine calls
/// these from inside its tick loop.
pub trait NoteSink {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, note: u8);
}

/// A recorded note event, in emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteEvent {
    On { channel: u8, note: u8, velocity: u8 },
    Off { channel: u8, note: u8 },
}

impl NoteSink for Vec<NoteEvent> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.push(NoteEvent::On {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.push(NoteEvent::Off { channel, note });
    }
}
