use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::{debug, info, warn};
use pcap::{Activated, Active, Capture, Device, Linktype};

use crate::config::SessionConfig;
use crate::layers::Layers;
use crate::summary::{summarize, SummaryOptions};
use crate::{Captured, CapturedPacket};

/// A blocking, in-order supply of packets.
///
/// `TimeoutExpired` means nothing arrived yet, `NoMorePackets` means the
/// source is done for good. Anything else is a backend failure.
pub trait PacketSource {
    fn recv(&mut self) -> Result<CapturedPacket, pcap::Error>;

    fn linktype(&self) -> Linktype {
        Linktype::ETHERNET
    }
}

impl<T: Activated + ?Sized> PacketSource for Capture<T> {
    fn recv(&mut self) -> Result<CapturedPacket, pcap::Error> {
        self.next_packet().map(CapturedPacket::from)
    }

    fn linktype(&self) -> Linktype {
        self.get_datalink()
    }
}

/// Adapts any iterator of packets, such as `Capture::iter`, into a source.
pub struct IterSource<I> {
    iter: I,
    linktype: Linktype,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Result<CapturedPacket, pcap::Error>>,
{
    pub fn new(iter: I, linktype: Linktype) -> Self {
        IterSource { iter, linktype }
    }
}

impl<I> PacketSource for IterSource<I>
where
    I: Iterator<Item = Result<CapturedPacket, pcap::Error>>,
{
    fn recv(&mut self) -> Result<CapturedPacket, pcap::Error> {
        self.iter.next().unwrap_or(Err(pcap::Error::NoMorePackets))
    }

    fn linktype(&self) -> Linktype {
        self.linktype
    }
}

#[derive(Debug)]
pub enum OpenError {
    /// No capability to read raw traffic; capture must not be attempted.
    PermissionDenied(pcap::Error),
    Backend(anyhow::Error),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::PermissionDenied(e) => write!(f, "permission denied: {}", e),
            OpenError::Backend(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for OpenError {}

pub fn is_permission_denied(err: &pcap::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("permission") || msg.contains("not permitted")
}

fn classify(err: pcap::Error, what: &str) -> OpenError {
    if is_permission_denied(&err) {
        OpenError::PermissionDenied(err)
    } else {
        OpenError::Backend(anyhow!(err).context(what.to_string()))
    }
}

pub const PAYLOAD_WARNING: &str =
    "WARNING: --show-payload will print part of packet payloads. Ensure you have permission to inspect contents.";

/// Writes one line of operator output. A closed stdout does not stop the session.
fn say<W: Write + ?Sized>(out: &mut W, line: fmt::Arguments<'_>) {
    if let Err(e) = writeln!(out, "{}", line) {
        debug!("Cannot print to output: {}", e);
    }
}

/// Prints the privacy warning (with `--show-payload`) and the start banner.
pub fn announce<W: Write + ?Sized>(config: &SessionConfig, out: &mut W) {
    if config.show_payload {
        say(out, format_args!("{}", PAYLOAD_WARNING));
    }
    say(out, format_args!("Starting capture. Press Ctrl-C to stop."));
}

/// Opens a live capture with the configured device, tuning and filter.
pub fn open_live(config: &SessionConfig) -> Result<Capture<Active>, OpenError> {
    let device = match &config.iface {
        Some(name) => Device::from(name.as_str()),
        None => Device::lookup()
            .map_err(|e| classify(e, "cannot look up default device"))?
            .ok_or_else(|| OpenError::Backend(anyhow!("no capture device available")))?,
    };
    info!("Using device {}", device.name);

    let tuning = &config.tuning;
    let mut cap = Capture::from_device(device)
        .map_err(|e| classify(e, "cannot setup capture"))?
        .promisc(tuning.promisc)
        .snaplen(tuning.snaplen)
        .timeout(tuning.timeout_ms)
        .immediate_mode(tuning.immediate_mode)
        .open()
        .map_err(|e| classify(e, "cannot open capture"))?;

    if let Some(filter) = &config.filter {
        cap.filter(filter, true)
            .map_err(|e| classify(e, &format!("cannot apply filter {:?}", filter)))?;
        info!("Filter applied: {}", filter);
    }

    Ok(cap)
}

/// Whether a session holding `captured` packets is done.
///
/// A limit of zero or below never stops.
pub fn should_stop(limit: i64, captured: usize) -> bool {
    limit > 0 && captured as u64 >= limit as u64
}

#[derive(Debug)]
pub enum Termination {
    LimitReached,
    Interrupted,
    Exhausted,
    Failed(pcap::Error),
}

/// Receives packets until the limit, an interrupt, exhaustion or a backend
/// failure, printing one summary line per packet to `out`.
///
/// Packets are appended to `captured` before the stop check, so whatever
/// arrived before the loop ended is kept.
pub fn run<S, W>(
    source: &mut S,
    options: &SummaryOptions,
    limit: i64,
    interrupted: &AtomicBool,
    captured: &mut Captured,
    out: &mut W,
) -> Termination
where
    S: PacketSource + ?Sized,
    W: Write,
{
    let linktype = source.linktype();
    loop {
        if interrupted.load(Ordering::SeqCst) {
            return Termination::Interrupted;
        }
        match source.recv() {
            Ok(packet) => {
                let line = summarize(&Layers::dissect(&packet, linktype), options, &Local::now().naive_local());
                captured.push(packet);
                say(out, format_args!("{}", line));
                if should_stop(limit, captured.len()) {
                    return Termination::LimitReached;
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => return Termination::Exhausted,
            Err(e) => return Termination::Failed(e),
        }
    }
}

#[derive(Debug)]
pub struct FinalizeReport {
    pub captured: usize,
    /// `None` when no write was attempted.
    pub written: Option<Result<PathBuf>>,
}

pub fn write_pcap(captured: &Captured, path: &Path) -> Result<()> {
    let dead = Capture::dead(captured.linktype).context("cannot create pcap writer")?;
    let mut savefile = dead
        .savefile(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    for packet in &captured.packets {
        savefile.write(&packet.as_packet());
    }
    savefile
        .flush()
        .with_context(|| format!("cannot flush {}", path.display()))?;
    Ok(())
}

/// Reports the capture and, if packets were captured and `output` is set,
/// writes them out. Write failures are reported, never raised.
pub fn finalize<W: Write>(captured: Captured, output: Option<&Path>, out: &mut W) -> FinalizeReport {
    if captured.is_empty() {
        say(out, format_args!("No packets captured."));
        return FinalizeReport { captured: 0, written: None };
    }

    say(out, format_args!("Captured {} packets.", captured.len()));
    let written = output.map(|path| {
        match write_pcap(&captured, path) {
            Ok(()) => {
                say(out, format_args!("Wrote packets to {}", path.display()));
                Ok(path.to_path_buf())
            }
            Err(e) => {
                warn!("Failed to write pcap: {:#}", e);
                Err(e)
            }
        }
    });
    FinalizeReport { captured: captured.len(), written }
}
