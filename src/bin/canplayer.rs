// canplayer/src/bin/canplayer.rs
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Command-line tool to replay a `candump` log file onto a CAN bus.
//!
//! Frames are sent with their recorded spacing, bounded by a minimum gap
//! and a maximum pause. With `--loopback-test` every frame must come back
//! from the bus unchanged, and the error rate is reported at the end.
//!
//! Press Ctrl-C to stop early; the statistics are still reported.

use anyhow::{Context, Result};
use canplayer::{
    bus::DEFAULT_BITRATE,
    config::{DEFAULT_GAP, DEFAULT_SKIP},
    dump::Reader,
    Bus, ReplayConfig, Replayer, SocketBus, VirtualBus,
};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use std::{
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// Builds the replay configuration from the command line.
fn replay_config(opts: &ArgMatches) -> ReplayConfig {
    ReplayConfig::default()
        .with_timestamps(!opts.get_flag("ignore-timestamps"))
        .with_error_frames(opts.get_flag("error-frames"))
        .with_loopback_test(opts.get_flag("loopback-test"))
        .with_gap(opts.get_one::<f64>("gap").copied().unwrap_or(DEFAULT_GAP))
        .with_skip(opts.get_one::<f64>("skip").copied().unwrap_or(DEFAULT_SKIP))
}

// Opens the bus selected on the command line.
fn open_bus(opts: &ArgMatches) -> Result<Box<dyn Bus>> {
    let bitrate = opts
        .get_one::<u32>("bitrate")
        .copied()
        .unwrap_or(DEFAULT_BITRATE);

    let bus: Box<dyn Bus> = match opts.get_one::<String>("interface").map(String::as_str) {
        Some("virtual") => Box::new(VirtualBus::new(bitrate)),
        _ => {
            let channel = opts
                .get_one::<String>("channel")
                .map(String::as_str)
                .unwrap_or("vcan0");

            let bus = SocketBus::open(channel, bitrate)
                .with_context(|| format!("Failed to open CAN interface '{}'", channel))?;

            if opts.get_flag("receive-own-messages") {
                bus.set_receive_own_messages(true)
                    .context("Failed to enable reception of own messages")?;
            }
            Box::new(bus)
        }
    };
    Ok(bus)
}

// Validates the options, opens the bus and the log file, then replays
// the file until it ends or the operator stops it.
fn play(opts: &ArgMatches, stop: Arc<AtomicBool>) -> Result<()> {
    let config = replay_config(opts);
    config.validate()?;

    let filename = opts
        .get_one::<String>("file")
        .context("No log file specified")?;

    let bus = open_bus(opts)?;

    let reader = Reader::from_file(filename)
        .with_context(|| format!("Error opening log file '{}'", filename))?;

    // The summary is logged by the session itself, on every exit path.
    Replayer::new(bus, config)?
        .with_stop_flag(stop)
        .run(reader.frames())?;
    Ok(())
}

// --------------------------------------------------------------------------

fn main() {
    let opts = Command::new("canplayer")
        .version(VERSION)
        .about("Replay a candump log file onto a CAN bus")
        .disable_help_flag(true)
        .arg(
            arg!(--help "Print help information")
                .short('?')
                .action(ArgAction::Help)
                .global(true),
        )
        .arg(
            arg!(-i --interface <iface> "The bus interface type")
                .required(false)
                .value_parser(["socketcan", "virtual"])
                .default_value("socketcan"),
        )
        .arg(
            arg!(-c --channel <channel> "The CAN channel to use, like 'can0', 'vcan0', etc")
                .required(false)
                .default_value("vcan0"),
        )
        .arg(
            arg!(-b --bitrate <bitrate> "The nominal bit rate of the bus (in Hz)")
                .required(false)
                .value_parser(value_parser!(u32))
                .default_value("500000"),
        )
        .arg(
            arg!(--"receive-own-messages" "Also receive the frames we send")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(--"ignore-timestamps" "Ignore the recorded timestamps, sending every 'gap' seconds")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(--"error-frames" "Also send the error frames in the log")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(--"loopback-test" "Verify that every frame sent is received back")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(-g --gap <secs> "Minimum time between frames, in seconds")
                .required(false)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(-s --skip <secs> "Longest pause to reproduce, in seconds")
                .required(false)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(-v --verbose "Show more detail (repeat for more)")
                .action(ArgAction::Count),
        )
        .arg(arg!(<file> "The candump log file to replay").required(true))
        .get_matches();

    let level = match opts.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        eprintln!("Failed to install the Ctrl-C handler: {}", err);
        process::exit(1);
    }

    if let Err(err) = play(&opts, stop) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
