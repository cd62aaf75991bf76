//! MIDI input: raw byte parsing and a midir-backed listener.
//!
//! The engine consumes typed `TransportEvent`s; the low-level decode from
//! status bytes lives here, at the edge. Real-time messages (0xF8-0xFC)
//! carry the external clock and transport; channel voice messages feed the
//! per-track external note offset.

use anyhow::{anyhow, Result};
use midir::{MidiInput, MidiInputConnection};

/// A decoded event from the external MIDI input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// MIDI real-time Start (0xFA)
    Start,
    /// MIDI real-time Continue (0xFB)
    Continue,
    /// MIDI real-time Stop (0xFC)
    Stop,
    /// MIDI real-time Timing Clock (0xF8), 24 per quarter note
    ClockPulse,
    /// Channel voice Note On, channel 1-16
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Channel voice Note Off, channel 1-16
    NoteOff { channel: u8, note: u8 },
}

/// Decode one MIDI message into a `TransportEvent`.
///
/// Messages the engine has no use for (CC, pitch bend, sysex, active
/// sensing) decode to `None`. A Note On with velocity 0 is treated as a
/// Note Off per MIDI convention.
pub fn parse_message(bytes: &[u8]) -> Option<TransportEvent> {
    let status = *bytes.first()?;
    match status {
        0xF8 => Some(TransportEvent::ClockPulse),
        0xFA => Some(TransportEvent::Start),
        0xFB => Some(TransportEvent::Continue),
        0xFC => Some(TransportEvent::Stop),
        0x80..=0x9F => {
            let channel = (status & 0x0F) + 1;
            let note = *bytes.get(1)? & 0x7F;
            let velocity = *bytes.get(2)? & 0x7F;
            if status >= 0x90 && velocity > 0 {
                Some(TransportEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                })
            } else {
                Some(TransportEvent::NoteOff { channel, note })
            }
        }
        _ => None,
    }
}

/// List available MIDI input ports.
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("Rhythmicon")?;
    let ports = midi_in.ports();
    Ok(ports
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect())
}

/// Connect to a MIDI input port by name (partial match supported) and
/// invoke `on_event` for every decoded message. The returned connection
/// must be kept alive for the callback to keep firing.
pub fn connect_input<F>(port_name: &str, mut on_event: F) -> Result<MidiInputConnection<()>>
where
    F: FnMut(TransportEvent) + Send + 'static,
{
    let mut midi_in = MidiInput::new("Rhythmicon")?;
    // Sysex is noise for us, but 0xF8 timing clock bytes must get through.
    midi_in.ignore(midir::Ignore::Sysex);
    let ports = midi_in.ports();

    let port = ports
        .iter()
        .find(|p| {
            midi_in
                .port_name(p)
                .map(|name| name.contains(port_name))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("MIDI input port '{}' not found", port_name))?;

    let connection = midi_in
        .connect(
            port,
            "rhythmicon-in",
            move |_timestamp, bytes, _| {
                if let Some(event) = parse_message(bytes) {
                    on_event(event);
                }
            },
            (),
        )
        .map_err(|e| anyhow!("MIDI input connect failed: {}", e))?;

    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_realtime_messages() {
        assert_eq!(parse_message(&[0xF8]), Some(TransportEvent::ClockPulse));
        assert_eq!(parse_message(&[0xFA]), Some(TransportEvent::Start));
        assert_eq!(parse_message(&[0xFB]), Some(TransportEvent::Continue));
        assert_eq!(parse_message(&[0xFC]), Some(TransportEvent::Stop));
    }

    #[test]
    fn test_parse_note_on_off() {
        assert_eq!(
            parse_message(&[0x90, 60, 100]),
            Some(TransportEvent::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            parse_message(&[0x85, 64, 0]),
            Some(TransportEvent::NoteOff {
                channel: 6,
                note: 64
            })
        );
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        assert_eq!(
            parse_message(&[0x9F, 72, 0]),
            Some(TransportEvent::NoteOff {
                channel: 16,
                note: 72
            })
        );
    }

    #[test]
    fn test_parse_ignores_unrelated_messages() {
        // Control change, pitch bend, active sensing
        assert_eq!(parse_message(&[0xB0, 7, 100]), None);
        assert_eq!(parse_message(&[0xE0, 0, 64]), None);
        assert_eq!(parse_message(&[0xFE]), None);
        assert_eq!(parse_message(&[]), None);
    }

    #[test]
    fn test_parse_truncated_note_message() {
        assert_eq!(parse_message(&[0x90, 60]), None);
        assert_eq!(parse_message(&[0x90]), None);
    }
}
