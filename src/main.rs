use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use envconfig::Envconfig;
use log::{debug, info, warn};
use pcap::Linktype;

use header_sniffer::config::{Args, Env, SessionConfig};
use header_sniffer::session::{announce, finalize, open_live, run, OpenError, PacketSource, Termination};
use header_sniffer::Captured;


fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SessionConfig::new(Args::parse(), Env::init_from_env()?);
    debug!("Session config: {:?}", config);

    announce(&config, &mut io::stdout().lock());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("cannot install Ctrl-C handler")?;

    let mut captured = Captured::new(Linktype::ETHERNET);
    match open_live(&config) {
        Ok(mut cap) => {
            captured.linktype = cap.linktype();
            let stdout = io::stdout();
            let termination = run(
                &mut cap,
                &config.summary_options(),
                config.count,
                &interrupted,
                &mut captured,
                &mut stdout.lock(),
            );
            match termination {
                Termination::Interrupted => println!("\nCapture interrupted by user."),
                Termination::Failed(e) => warn!("Error while capturing: {}", e),
                other => debug!("Capture ended: {:?}", other),
            }
            match cap.stats() {
                Ok(stats) => info!(
                    "Backend stats: received={} dropped={} if_dropped={}",
                    stats.received, stats.dropped, stats.if_dropped
                ),
                Err(e) => debug!("Cannot read backend stats: {}", e),
            }
        }
        Err(OpenError::PermissionDenied(e)) => {
            return Err(e).context(
                "Permission denied. Try running as root/administrator (or pick a privileged interface)",
            );
        }
        Err(OpenError::Backend(e)) => warn!("Error while capturing: {:#}", e),
    }

    finalize(captured, config.output.as_deref(), &mut io::stdout().lock());
    Ok(())
}
