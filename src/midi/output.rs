//! MIDI output over midir, with a channel-based architecture: the midir
//! connection is owned by a dedicated thread fed by a command channel, so
//! any thread (the engine thread included) can emit notes without sharing
//! the connection.

use anyhow::{anyhow, Result};
use midir::{MidiOutput, MidiOutputConnection};
use std::sync::mpsc::{channel, Sender};
use std::sync::RwLock;
use std::thread::{self, JoinHandle};

use crate::midi::sink::NoteSink;

/// Commands that can be sent to the MIDI output thread
#[derive(Debug, Clone)]
enum MidiCommand {
    /// Connect to a MIDI port by name
    Connect { port_name: String },
    /// Send Note On: channel (1-16), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Send Note Off: channel (1-16), note (0-127)
    NoteOff { channel: u8, note: u8 },
    /// Send All Notes Off (CC 123) on the given channel
    AllNotesOff { channel: u8 },
    /// Shutdown the MIDI thread
    Shutdown,
}

/// Map a 1-16 channel to the 0-15 wire nibble.
fn wire_channel(channel: u8) -> u8 {
    channel.clamp(1, 16) - 1
}

/// Internal MIDI output handler that owns the connection
struct MidiOutputInternal {
    connection: Option<MidiOutputConnection>,
    command_rx: std::sync::mpsc::Receiver<MidiCommand>,
}

impl MidiOutputInternal {
    fn new(command_rx: std::sync::mpsc::Receiver<MidiCommand>) -> Self {
        Self {
            connection: None,
            command_rx,
        }
    }

    fn connect(&mut self, port_name: &str) -> Result<()> {
        let midi_out = MidiOutput::new("Rhythmicon")?;
        let ports = midi_out.ports();

        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name.contains(port_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", port_name))?;

        let connection = midi_out
            .connect(port, "rhythmicon-out")
            .map_err(|e| anyhow!("MIDI connect failed: {}", e))?;
        self.connection = Some(connection);
        Ok(())
    }

    fn run(&mut self) {
        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                MidiCommand::Connect { port_name } => {
                    if let Err(e) = self.connect(&port_name) {
                        eprintln!("MIDI connect error: {}", e);
                    }
                }
                MidiCommand::NoteOn {
                    channel,
                    note,
                    velocity,
                } => {
                    if let Some(conn) = &mut self.connection {
                        // MIDI Note On: 0x90 + channel, note, velocity
                        let _ = conn.send(&[
                            0x90 | wire_channel(channel),
                            note & 0x7F,
                            velocity & 0x7F,
                        ]);
                    }
                }
                MidiCommand::NoteOff { channel, note } => {
                    if let Some(conn) = &mut self.connection {
                        // MIDI Note Off: 0x80 + channel, note, velocity 0
                        let _ = conn.send(&[0x80 | wire_channel(channel), note & 0x7F, 0]);
                    }
                }
                MidiCommand::AllNotesOff { channel } => {
                    if let Some(conn) = &mut self.connection {
                        let _ = conn.send(&[0xB0 | wire_channel(channel), 123, 0]);
                    }
                }
                MidiCommand::Shutdown => {
                    // Send All Notes Off on all channels before shutting down
                    if let Some(conn) = &mut self.connection {
                        for ch in 0..16u8 {
                            let _ = conn.send(&[0xB0 | ch, 123, 0]);
                        }
                    }
                    break;
                }
            }
        }
    }
}

/// Thread-safe handle to the MIDI output
/// Uses internal channels to communicate with the MIDI thread
pub struct MidiOutputHandle {
    command_tx: Sender<MidiCommand>,
    _thread: JoinHandle<()>,
    /// Whether we're connected to a MIDI port
    connected: RwLock<bool>,
    /// Name of the connected port
    port_name: RwLock<Option<String>>,
}

impl MidiOutputHandle {
    /// Create a new MIDI output handle (not connected to any port yet)
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();

        let thread = thread::spawn(move || {
            let mut internal = MidiOutputInternal::new(rx);
            internal.run();
        });

        Ok(Self {
            command_tx: tx,
            _thread: thread,
            connected: RwLock::new(false),
            port_name: RwLock::new(None),
        })
    }

    /// List available MIDI output ports
    /// Note: Creates a temporary MIDI client, which can sometimes fail on macOS.
    /// Retries up to 3 times with a small delay.
    pub fn list_ports() -> Result<Vec<String>> {
        let mut last_err = None;
        for attempt in 0..3 {
            if attempt > 0 {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            match MidiOutput::new("Rhythmicon") {
                Ok(midi_out) => {
                    let ports = midi_out.ports();
                    let names: Vec<String> = ports
                        .iter()
                        .filter_map(|p| midi_out.port_name(p).ok())
                        .collect();
                    return Ok(names);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }
        Err(anyhow!(
            "MIDI initialization failed after 3 attempts: {:?}",
            last_err
        ))
    }

    /// Connect to a MIDI output port by name (partial match supported)
    pub fn connect(&self, port_name: &str) -> Result<()> {
        // Validate port exists before sending command
        let midi_out = MidiOutput::new("Rhythmicon")?;
        let ports = midi_out.ports();

        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name.contains(port_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", port_name))?;

        let actual_name = midi_out.port_name(port)?;

        self.command_tx
            .send(MidiCommand::Connect {
                port_name: port_name.to_string(),
            })
            .map_err(|e| anyhow!("Failed to send connect command: {}", e))?;

        {
            let mut connected = self.connected.write().unwrap();
            let mut stored_name = self.port_name.write().unwrap();
            *connected = true;
            *stored_name = Some(actual_name);
        }

        Ok(())
    }

    /// Check if connected to a MIDI port
    pub fn is_connected(&self) -> bool {
        *self.connected.read().unwrap()
    }

    /// Get the name of the connected port
    pub fn connected_port(&self) -> Option<String> {
        self.port_name.read().unwrap().clone()
    }

    /// Send All Notes Off on all channels (MIDI panic)
    pub fn panic_all(&self) -> Result<()> {
        for ch in 1..=16u8 {
            self.command_tx
                .send(MidiCommand::AllNotesOff { channel: ch })
                .map_err(|e| anyhow!("Failed to send all notes off: {}", e))?;
        }
        Ok(())
    }
}

impl NoteSink for MidiOutputHandle {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if let Err(e) = self.command_tx.send(MidiCommand::NoteOn {
            channel,
            note,
            velocity,
        }) {
            eprintln!("MIDI note on send failed: {}", e);
        }
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        if let Err(e) = self.command_tx.send(MidiCommand::NoteOff { channel, note }) {
            eprintln!("MIDI note off send failed: {}", e);
        }
    }
}

impl Drop for MidiOutputHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(MidiCommand::Shutdown);
    }
}
