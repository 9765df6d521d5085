use std::path::PathBuf;

use clap::Parser;
use envconfig::Envconfig;

use crate::summary::SummaryOptions;

/// Header-focused network sniffer
#[derive(Parser, Debug)]
#[command(name = "header-sniffer", version, about = "Simple header-focused network sniffer")]
pub struct Args {
    /// Interface to capture on (default: the platform's default device)
    #[arg(short, long)]
    pub iface: Option<String>,

    /// BPF filter (tcp, udp, port 80, host 1.2.3.4 ...)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Number of packets to capture (0 for unlimited).
    /// Captured packets are kept in memory until exit.
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub count: i64,

    /// Write captured packets to a pcap file on exit
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Show a short payload preview (use cautiously)
    #[arg(long)]
    pub show_payload: bool,
}

#[derive(Envconfig, Debug)]
pub struct Env {
    #[envconfig(from = "SNIFFER_SNAPLEN", default = "65535")]
    pub snaplen: i32,

    #[envconfig(from = "SNIFFER_PROMISC", default = "true")]
    pub promisc: bool,

    #[envconfig(from = "SNIFFER_TIMEOUT_MS", default = "500")]
    pub timeout_ms: i32,

    #[envconfig(from = "SNIFFER_IMMEDIATE_MODE", default = "true")]
    pub immediate_mode: bool,

    #[envconfig(from = "SNIFFER_PAYLOAD_LIMIT", default = "64")]
    pub payload_limit: usize,
}

/// Knobs handed to the capture backend when opening a live handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTuning {
    pub snaplen: i32,
    pub promisc: bool,
    pub timeout_ms: i32,
    pub immediate_mode: bool,
}

impl Default for CaptureTuning {
    fn default() -> Self {
        CaptureTuning {
            snaplen: 65535,
            promisc: true,
            timeout_ms: 500,
            immediate_mode: true,
        }
    }
}

/// Everything a capture session needs, fixed before the first packet arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub iface: Option<String>,
    pub filter: Option<String>,
    pub count: i64,
    pub output: Option<PathBuf>,
    pub show_payload: bool,
    pub payload_limit: usize,
    pub tuning: CaptureTuning,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            iface: None,
            filter: None,
            count: 0,
            output: None,
            show_payload: false,
            payload_limit: 64,
            tuning: CaptureTuning::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(args: Args, env: Env) -> Self {
        SessionConfig {
            iface: args.iface,
            // an empty expression means "capture everything"
            filter: args.filter.filter(|f| !f.trim().is_empty()),
            count: args.count,
            output: args.output,
            show_payload: args.show_payload,
            payload_limit: env.payload_limit,
            tuning: CaptureTuning {
                snaplen: env.snaplen,
                promisc: env.promisc,
                timeout_ms: env.timeout_ms,
                immediate_mode: env.immediate_mode,
            },
        }
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            show_payload: self.show_payload,
            payload_limit: self.payload_limit,
        }
    }
}
