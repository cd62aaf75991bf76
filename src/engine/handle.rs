//! Threaded engine host: pacing loop plus transport command queue.
//!
//! Transport events (MIDI Start/Stop/Continue) and parameter edits arrive
//! asynchronously, but `RhythmEngine::tick()` reads the pulse counter,
//! divider phases, and track indices that a transport transition mutates
//! as a group. The sequencing thread therefore owns the engine outright
//! and drains a single command queue only at the top of its loop, so every
//! transition is applied atomically between ticks, with no lock and no
//! partially applied state.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::engine::{RhythmEngine, StepMode, TempoSource, Transport, NUM_TRACKS};
use crate::midi::{NoteSink, TransportEvent};
use crate::types::Scale;

/// Commands consumed by the sequencing thread at tick-loop boundaries.
#[derive(Clone, Copy, Debug)]
pub enum EngineCommand {
    /// Transport Start: all notes off, resync, run from the top.
    Start,
    /// Transport Stop: all notes off, idle.
    Stop,
    /// Transport Continue: resume without resetting phase.
    Continue,
    /// External 24-PPQN reference pulse (tempo estimation only).
    ClockPulse,
    /// Live note input for the external-offset feature.
    NoteInput { channel: u8, note: u8 },
    SetBpm(u16),
    SetRoot { track: usize, root: u8 },
    SetScale { track: usize, scale: Scale },
    SetStepMode { track: usize, mode: StepMode },
    SetStep { track: usize, step: usize, offset: i8 },
    SetOutputChannel { track: usize, channel: u8 },
    SetInputChannel { track: usize, channel: u8 },
    SetDividerRatio { slot: usize, ratio: u16 },
    SetClockSource { track: usize, slot: usize, enabled: bool },
    Shutdown,
}

impl EngineCommand {
    /// Map a decoded MIDI input event to a command, if the engine consumes
    /// it. Note-offs carry no offset information and are dropped.
    pub fn from_transport(event: TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::Start => Some(EngineCommand::Start),
            TransportEvent::Continue => Some(EngineCommand::Continue),
            TransportEvent::Stop => Some(EngineCommand::Stop),
            TransportEvent::ClockPulse => Some(EngineCommand::ClockPulse),
            TransportEvent::NoteOn { channel, note, .. } => {
                Some(EngineCommand::NoteInput { channel, note })
            }
            TransportEvent::NoteOff { .. } => None,
        }
    }
}

/// Value published when a track has not sounded yet.
const NO_NOTE: u64 = u64::MAX;

/// Lock-free telemetry published by the sequencing thread for display
/// layers: transport state, tempo, and per-track position.
struct EngineSnapshot {
    running: AtomicBool,
    bpm: AtomicU64,
    track_index: [AtomicU64; NUM_TRACKS],
    track_last_note: [AtomicU64; NUM_TRACKS],
}

impl EngineSnapshot {
    fn new(bpm: u16) -> Self {
        Self {
            running: AtomicBool::new(false),
            bpm: AtomicU64::new(bpm as u64),
            track_index: std::array::from_fn(|_| AtomicU64::new(0)),
            track_last_note: std::array::from_fn(|_| AtomicU64::new(NO_NOTE)),
        }
    }
}

/// Handle to the sequencing thread.
///
/// Cheap to share: all methods enqueue commands or read the published
/// snapshot. Dropping the handle shuts the thread down.
pub struct EngineHandle {
    command_tx: Sender<EngineCommand>,
    snapshot: Arc<EngineSnapshot>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Spawn the sequencing thread around an engine emitting into `sink`.
    pub fn spawn<S>(engine: RhythmEngine, bpm: u16, sink: S) -> Self
    where
        S: NoteSink + Send + 'static,
    {
        let (command_tx, command_rx) = bounded(256);
        let snapshot = Arc::new(EngineSnapshot::new(bpm));
        let thread_snapshot = Arc::clone(&snapshot);

        let thread = thread::spawn(move || {
            EngineThread {
                engine,
                tempo: TempoSource::new(bpm),
                sink,
                command_rx,
                snapshot: thread_snapshot,
            }
            .run();
        });

        Self {
            command_tx,
            snapshot,
            thread: Some(thread),
        }
    }

    /// Sender for feeding commands from other contexts, e.g. a MIDI input
    /// callback.
    pub fn command_sender(&self) -> Sender<EngineCommand> {
        self.command_tx.clone()
    }

    pub fn send(&self, command: EngineCommand) {
        let _ = self.command_tx.send(command);
    }

    pub fn start(&self) {
        self.send(EngineCommand::Start);
    }

    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    pub fn continue_from(&self) {
        self.send(EngineCommand::Continue);
    }

    pub fn set_bpm(&self, bpm: u16) {
        self.send(EngineCommand::SetBpm(bpm));
    }

    /// Whether the transport is currently running.
    pub fn is_running(&self) -> bool {
        self.snapshot.running.load(Ordering::Relaxed)
    }

    /// Current tempo, local or externally derived.
    pub fn bpm(&self) -> u16 {
        self.snapshot.bpm.load(Ordering::Relaxed) as u16
    }

    /// Live play position of a track, for visual feedback.
    pub fn track_index(&self, track: usize) -> usize {
        self.snapshot
            .track_index
            .get(track)
            .map(|i| i.load(Ordering::Relaxed) as usize)
            .unwrap_or(0)
    }

    /// Last note a track emitted, for visual feedback.
    pub fn track_last_note(&self, track: usize) -> Option<u8> {
        self.snapshot
            .track_last_note
            .get(track)
            .map(|n| n.load(Ordering::Relaxed))
            .filter(|&n| n != NO_NOTE)
            .map(|n| n as u8)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The sequencing thread: sole owner of the engine and tempo source.
struct EngineThread<S: NoteSink> {
    engine: RhythmEngine,
    tempo: TempoSource,
    sink: S,
    command_rx: Receiver<EngineCommand>,
    snapshot: Arc<EngineSnapshot>,
}

impl<S: NoteSink> EngineThread<S> {
    fn run(&mut self) {
        let mut next_tick: Option<Instant> = None;

        loop {
            if self.engine.transport() == Transport::Running {
                // Drain pending commands; each applies atomically between
                // ticks.
                while let Ok(command) = self.command_rx.try_recv() {
                    if self.handle_command(command) {
                        return;
                    }
                }

                let now = Instant::now();
                match next_tick {
                    Some(target) if now >= target => {
                        self.engine.tick(&mut self.sink);
                        self.publish();
                        next_tick = Some(target + self.tempo.pulse_period());
                    }
                    Some(target) => {
                        // Sleep toward the deadline, spin the last stretch
                        // for precision.
                        let remaining = target - now;
                        if remaining > Duration::from_micros(500) {
                            thread::sleep(Duration::from_micros(100));
                        } else {
                            std::hint::spin_loop();
                        }
                    }
                    None => {
                        self.engine.tick(&mut self.sink);
                        self.publish();
                        next_tick = Some(Instant::now() + self.tempo.pulse_period());
                    }
                }
            } else {
                // Idle: nothing to pace, block until the next command.
                next_tick = None;
                match self.command_rx.recv() {
                    Ok(command) => {
                        if self.handle_command(command) {
                            return;
                        }
                    }
                    Err(_) => return, // all handles dropped
                }
            }
        }
    }

    /// Apply one command. Returns `true` on shutdown.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Start => {
                self.engine.start(&mut self.sink);
                self.tempo.resync();
            }
            EngineCommand::Stop => self.engine.stop(&mut self.sink),
            EngineCommand::Continue => self.engine.continue_from(),
            EngineCommand::ClockPulse => self.tempo.on_external_pulse(Instant::now()),
            EngineCommand::NoteInput { channel, note } => self.engine.note_input(channel, note),
            EngineCommand::SetBpm(bpm) => self.tempo.set_bpm(bpm),
            EngineCommand::SetRoot { track, root } => self.engine.set_track_root(track, root),
            EngineCommand::SetScale { track, scale } => self.engine.set_track_scale(track, scale),
            EngineCommand::SetStepMode { track, mode } => {
                self.engine.set_track_step_mode(track, mode)
            }
            EngineCommand::SetStep {
                track,
                step,
                offset,
            } => self.engine.set_track_step(track, step, offset),
            EngineCommand::SetOutputChannel { track, channel } => {
                self.engine.set_track_output_channel(track, channel)
            }
            EngineCommand::SetInputChannel { track, channel } => {
                self.engine.set_track_input_channel(track, channel)
            }
            EngineCommand::SetDividerRatio { slot, ratio } => {
                self.engine.set_divider_ratio(slot, ratio)
            }
            EngineCommand::SetClockSource {
                track,
                slot,
                enabled,
            } => self.engine.set_clock_source(track, slot, enabled),
            EngineCommand::Shutdown => {
                self.engine.stop(&mut self.sink);
                self.publish();
                return true;
            }
        }
        self.publish();
        false
    }

    fn publish(&self) {
        let snapshot = &self.snapshot;
        snapshot.running.store(
            self.engine.transport() == Transport::Running,
            Ordering::Relaxed,
        );
        snapshot
            .bpm
            .store(self.tempo.bpm() as u64, Ordering::Relaxed);
        for track in 0..NUM_TRACKS {
            snapshot.track_index[track]
                .store(self.engine.track_index(track) as u64, Ordering::Relaxed);
            let note = self
                .engine
                .track_last_note(track)
                .map(|n| n as u64)
                .unwrap_or(NO_NOTE);
            snapshot.track_last_note[track].store(note, Ordering::Relaxed);
        }
    }
}
