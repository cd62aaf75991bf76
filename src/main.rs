//! Host binary: wires the rhythm engine to real MIDI ports.
//!
//! The engine runs on its own paced thread; MIDI input events (transport,
//! clock, notes) are forwarded to its command queue from the midir
//! callback, and notes flow out through the midir output thread. A small
//! stdin loop provides local transport control.

use anyhow::{anyhow, Result};
use std::io::{self, BufRead, Write};

use rhythmicon::engine::{EngineCommand, EngineHandle, RhythmEngine, NUM_TRACKS};
use rhythmicon::midi::{self, MidiOutputHandle};

fn print_usage() {
    println!("Usage: rhythmicon [--list] [--out PORT] [--in PORT] [--bpm N]");
    println!();
    println!("  --list      list MIDI ports and exit");
    println!("  --out PORT  MIDI output port (partial name match)");
    println!("  --in PORT   MIDI input port for external clock/transport");
    println!("  --bpm N     initial tempo (default 120)");
}

fn list_ports() -> Result<()> {
    println!("MIDI output ports:");
    for name in MidiOutputHandle::list_ports()? {
        println!("  {}", name);
    }
    println!("MIDI input ports:");
    for name in midi::list_input_ports()? {
        println!("  {}", name);
    }
    Ok(())
}

struct Options {
    list: bool,
    out_port: Option<String>,
    in_port: Option<String>,
    bpm: u16,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        list: false,
        out_port: None,
        in_port: None,
        bpm: 120,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list" => options.list = true,
            "--out" => options.out_port = Some(args.next().ok_or_else(|| anyhow!("--out needs a port name"))?),
            "--in" => options.in_port = Some(args.next().ok_or_else(|| anyhow!("--in needs a port name"))?),
            "--bpm" => {
                let value = args.next().ok_or_else(|| anyhow!("--bpm needs a value"))?;
                options.bpm = value.parse()?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(anyhow!("unknown argument '{}'", other)),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    let options = parse_args()?;
    if options.list {
        return list_ports();
    }

    let output = MidiOutputHandle::new()?;
    match &options.out_port {
        Some(port) => output.connect(port)?,
        None => {
            let ports = MidiOutputHandle::list_ports()?;
            let first = ports
                .first()
                .ok_or_else(|| anyhow!("no MIDI output ports available"))?;
            output.connect(first)?;
        }
    }
    println!(
        "MIDI out: {}",
        output.connected_port().unwrap_or_default()
    );

    let handle = EngineHandle::spawn(RhythmEngine::new(), options.bpm, output);

    // Keep the input connection alive for the duration of the run; its
    // callback feeds the engine's command queue.
    let _input = match &options.in_port {
        Some(port) => {
            let tx = handle.command_sender();
            let connection = midi::connect_input(port, move |event| {
                if let Some(command) = EngineCommand::from_transport(event) {
                    let _ = tx.send(command);
                }
            })?;
            println!("MIDI in: {}", port);
            Some(connection)
        }
        None => None,
    };

    println!("Commands: start | stop | continue | bpm N | status | quit");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let mut words = line.split_whitespace();
        match words.next() {
            Some("start") => handle.start(),
            Some("stop") => handle.stop(),
            Some("continue") => handle.continue_from(),
            Some("bpm") => match words.next().map(str::parse::<u16>) {
                Some(Ok(bpm)) => handle.set_bpm(bpm),
                _ => println!("usage: bpm N"),
            },
            Some("status") => {
                println!(
                    "{} at {} BPM",
                    if handle.is_running() { "running" } else { "idle" },
                    handle.bpm()
                );
                for track in 0..NUM_TRACKS {
                    println!(
                        "  track {}: step {} last note {:?}",
                        track + 1,
                        handle.track_index(track),
                        handle.track_last_note(track)
                    );
                }
            }
            Some("quit") | Some("exit") => break,
            Some(other) => println!("unknown command '{}'", other),
            None => {}
        }
    }

    handle.stop();
    Ok(())
}
