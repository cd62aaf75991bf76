// src/midi/mod.rs

pub mod input;
pub mod output;
pub mod sink;

pub use input::{connect_input, list_input_ports, parse_message, TransportEvent};
pub use output::MidiOutputHandle;
pub use sink::{NoteEvent, NoteSink};
