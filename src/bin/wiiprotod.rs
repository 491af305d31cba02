//! A minimal command-line entry point that wires [`wiiproto`] together: it
//! connects to one already-known controller address, applies an optional
//! mapping file, and runs until interrupted.
//!
//! Enumerating nearby controllers and a full mapping-file grammar/lexer
//! are out of scope for this crate (see [`wiiproto::discovery`] and
//! [`wiiproto::mapping`]); this binary exists only to exercise the
//! library end to end, not to replace a production CLI or tray app.

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use wiiproto::address::BdAddr;
use wiiproto::{Config, ControllerAddress, MappingProfile, SessionRegistry};

#[derive(Debug, Parser)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// The controller's Bluetooth address, e.g. `00:1F:32:AA:BB:CC`.
    #[arg(value_parser = parse_bdaddr)]
    address: BdAddr,

    /// The controller's advertised Bluetooth name, used to tell protocol
    /// generations apart (see [`wiiproto::address::ControllerAddress`]).
    #[arg(default_value = "Nintendo RVL-CNT-01")]
    name: String,

    /// Path to a file of mapping-profile lines (`source = target ...`,
    /// one per line; blank lines and `#`-comments are skipped). Malformed
    /// lines are logged and skipped, not fatal.
    #[arg(short, long)]
    mapping: Option<std::path::PathBuf>,
}

fn parse_bdaddr(input: &str) -> Result<BdAddr, String> {
    let mut bytes = [0u8; 6];
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 6 {
        return Err(format!("expected AA:BB:CC:DD:EE:FF, got `{input}`"));
    }
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16).map_err(|e| e.to_string())?;
    }
    Ok(BdAddr(bytes))
}

fn load_mapping(path: Option<&std::path::Path>) -> MappingProfile {
    let mut profile = MappingProfile::new("default");
    let Some(path) = path else { return profile };
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            error!(?path, error = %err, "could not read mapping file, using an empty profile");
            return profile;
        }
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(err) = profile.apply_line(line) {
            tracing::warn!(%line, error = %err, "skipping malformed mapping line");
        }
    }
    profile
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let address = ControllerAddress::new(args.address, args.name);
    let mapping = load_mapping(args.mapping.as_deref());

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let mut registry = SessionRegistry::new(Config::default());
    let session = registry.connect(address, mapping)?;
    info!(address = %session.address, "connected, press Ctrl-C to exit");

    while !shutdown.load(Ordering::Relaxed) && !session.is_disconnected() {
        std::thread::sleep(Duration::from_millis(200));
    }

    registry.shutdown();
    Ok(())
}
