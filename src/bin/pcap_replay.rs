use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;
use envconfig::Envconfig;
use log::warn;
use pcap::Capture;

use header_sniffer::config::Env;
use header_sniffer::session::{run, IterSource, Termination};
use header_sniffer::summary::SummaryOptions;
use header_sniffer::{Captured, OwnedCodec};

/// Print header summaries of a saved capture file
#[derive(Parser, Debug)]
struct Args {
    /// Capture file to read
    file: PathBuf,

    /// Show a short payload preview
    #[arg(long)]
    show_payload: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let env = Env::init_from_env()?;

    let cap = Capture::from_file(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let linktype = cap.get_datalink();
    let mut source = IterSource::new(cap.iter(OwnedCodec), linktype);

    let options = SummaryOptions { show_payload: args.show_payload, payload_limit: env.payload_limit };
    let mut captured = Captured::new(linktype);
    let stdout = io::stdout();
    if let Termination::Failed(e) = run(
        &mut source,
        &options,
        0,
        &AtomicBool::new(false),
        &mut captured,
        &mut stdout.lock(),
    ) {
        warn!("Error while reading {}: {}", args.file.display(), e);
    }

    println!("Read {} packets from {}", captured.len(), args.file.display());
    Ok(())
}
