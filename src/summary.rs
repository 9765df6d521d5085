use std::fmt;

use chrono::NaiveDateTime;
use etherparse::TcpHeaderSlice;

use crate::layers::Layers;
use crate::payload;

const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    pub show_payload: bool,
    pub payload_limit: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        SummaryOptions { show_payload: false, payload_limit: 64 }
    }
}

/// TCP control bits, stored in header order starting from FIN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags(pub u16);

impl TcpFlags {
    pub const FIN: u16 = 1 << 0;
    pub const SYN: u16 = 1 << 1;
    pub const RST: u16 = 1 << 2;
    pub const PSH: u16 = 1 << 3;
    pub const ACK: u16 = 1 << 4;
    pub const URG: u16 = 1 << 5;
    pub const ECE: u16 = 1 << 6;
    pub const CWR: u16 = 1 << 7;
    pub const NS: u16 = 1 << 8;

    const LETTERS: &'static [u8; 9] = b"FSRPAUECN";

    pub fn from_header(tcp: &TcpHeaderSlice) -> Self {
        let bits = [
            tcp.fin(),
            tcp.syn(),
            tcp.rst(),
            tcp.psh(),
            tcp.ack(),
            tcp.urg(),
            tcp.ece(),
            tcp.cwr(),
            tcp.ns(),
        ];
        TcpFlags(
            bits.iter()
                .enumerate()
                .filter(|(_, set)| **set)
                .fold(0, |acc, (i, _)| acc | 1 << i),
        )
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, letter) in Self::LETTERS.iter().enumerate() {
            if self.0 & (1 << i) != 0 {
                write!(f, "{}", *letter as char)?;
            }
        }
        Ok(())
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Renders the one-line summary of a packet.
///
/// TCP wins over UDP when both are present; otherwise the highest recognized
/// layer names the packet, or `Other` when nothing was recognized.
pub fn summarize(layers: &Layers, options: &SummaryOptions, ts: &NaiveDateTime) -> String {
    let (src, dst) = match layers.network {
        Some((src, dst)) => (src.to_string(), dst.to_string()),
        None => (PLACEHOLDER.to_string(), PLACEHOLDER.to_string()),
    };

    let (proto, sport, dport, extra) = if let Some(tcp) = &layers.tcp {
        ("TCP", tcp.source_port.to_string(), tcp.destination_port.to_string(), format!("flags={}", tcp.flags))
    } else if let Some(udp) = &layers.udp {
        ("UDP", udp.source_port.to_string(), udp.destination_port.to_string(), String::new())
    } else {
        (
            layers.highest.unwrap_or("Other"),
            PLACEHOLDER.to_string(),
            PLACEHOLDER.to_string(),
            String::new(),
        )
    };

    let preview = match (&layers.payload, options.show_payload) {
        (Some(raw), true) => payload::render(raw, options.payload_limit),
        _ => String::new(),
    };

    format!(
        "[{}] {:4} {}:{} -> {}:{} len={} {}{}",
        format_timestamp(ts),
        proto,
        src,
        sport,
        dst,
        dport,
        layers.wire_len,
        extra,
        preview
    )
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use chrono::NaiveDate;

    use super::*;
    use crate::layers::{RawPayload, TcpLayer, UdpLayer};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .unwrap()
    }

    fn ipv4() -> Option<(IpAddr, IpAddr)> {
        Some((Ipv4Addr::new(192, 168, 1, 10).into(), Ipv4Addr::new(1, 1, 1, 1).into()))
    }

    fn tcp(flags: u16) -> Option<TcpLayer> {
        Some(TcpLayer { source_port: 51000, destination_port: 443, flags: TcpFlags(flags) })
    }

    #[test]
    fn tcp_line() {
        let layers = Layers {
            network: ipv4(),
            tcp: tcp(TcpFlags::SYN),
            highest: Some("TCP"),
            wire_len: 74,
            ..Layers::default()
        };
        assert_eq!(
            summarize(&layers, &SummaryOptions::default(), &ts()),
            "[2024-03-09 14:05:07] TCP  192.168.1.10:51000 -> 1.1.1.1:443 len=74 flags=S"
        );
    }

    #[test]
    fn udp_line_has_trailing_space() {
        let layers = Layers {
            network: Some((Ipv6Addr::LOCALHOST.into(), Ipv6Addr::LOCALHOST.into())),
            udp: Some(UdpLayer { source_port: 5353, destination_port: 53 }),
            highest: Some("UDP"),
            wire_len: 62,
            ..Layers::default()
        };
        assert_eq!(
            summarize(&layers, &SummaryOptions::default(), &ts()),
            "[2024-03-09 14:05:07] UDP  ::1:5353 -> ::1:53 len=62 "
        );
    }

    #[test]
    fn tcp_takes_precedence_over_udp() {
        let layers = Layers {
            network: ipv4(),
            tcp: tcp(TcpFlags::PSH | TcpFlags::ACK),
            udp: Some(UdpLayer { source_port: 1, destination_port: 2 }),
            wire_len: 100,
            ..Layers::default()
        };
        let line = summarize(&layers, &SummaryOptions::default(), &ts());
        assert!(line.contains("] TCP  192.168.1.10:51000 -> 1.1.1.1:443 "), "{}", line);
        assert!(line.ends_with("flags=PA"));
        assert!(!line.contains("UDP"));
    }

    #[test]
    fn fallback_uses_highest_layer() {
        let layers = Layers { highest: Some("ARP"), wire_len: 42, ..Layers::default() };
        assert_eq!(
            summarize(&layers, &SummaryOptions::default(), &ts()),
            "[2024-03-09 14:05:07] ARP  -:- -> -:- len=42 "
        );
    }

    #[test]
    fn fallback_without_any_layer_is_other() {
        let layers = Layers { wire_len: 3, ..Layers::default() };
        assert_eq!(
            summarize(&layers, &SummaryOptions::default(), &ts()),
            "[2024-03-09 14:05:07] Other -:- -> -:- len=3 "
        );
    }

    #[test]
    fn icmp_keeps_addresses() {
        let layers = Layers { network: ipv4(), highest: Some("ICMP"), wire_len: 98, ..Layers::default() };
        let line = summarize(&layers, &SummaryOptions::default(), &ts());
        assert_eq!(line, "[2024-03-09 14:05:07] ICMP 192.168.1.10:- -> 1.1.1.1:- len=98 ");
    }

    #[test]
    fn payload_only_when_enabled() {
        let layers = Layers {
            network: ipv4(),
            tcp: tcp(TcpFlags::ACK),
            payload: Some(RawPayload::Bytes(b"Hi\x00\x7f")),
            wire_len: 58,
            ..Layers::default()
        };
        let quiet = summarize(&layers, &SummaryOptions::default(), &ts());
        assert!(quiet.ends_with("flags=A"));

        let options = SummaryOptions { show_payload: true, payload_limit: 64 };
        let loud = summarize(&layers, &options, &ts());
        assert!(loud.ends_with("flags=A payload_preview(hex/ASCII)=4869007f / Hi.."), "{}", loud);
    }

    #[test]
    fn unprintable_payload_does_not_abort() {
        let layers = Layers {
            highest: Some("Ethernet"),
            payload: Some(RawPayload::Malformed("truncated".into())),
            wire_len: 17,
            ..Layers::default()
        };
        let options = SummaryOptions { show_payload: true, payload_limit: 64 };
        assert!(summarize(&layers, &options, &ts()).ends_with("len=17  payload_preview=<binary-unprintable>"));
    }

    #[test]
    fn summary_is_deterministic() {
        let layers = Layers {
            network: ipv4(),
            tcp: tcp(TcpFlags::FIN | TcpFlags::ACK),
            payload: Some(RawPayload::Bytes(b"bye")),
            wire_len: 66,
            ..Layers::default()
        };
        let options = SummaryOptions { show_payload: true, payload_limit: 2 };
        let first = summarize(&layers, &options, &ts());
        assert_eq!(first, summarize(&layers, &options, &ts()));
        assert!(first.ends_with("flags=FA payload_preview(hex/ASCII)=6279 / by"));
    }

    #[test]
    fn flag_letters_follow_header_order() {
        assert_eq!(TcpFlags(TcpFlags::SYN | TcpFlags::ACK).to_string(), "SA");
        assert_eq!(TcpFlags(TcpFlags::NS | TcpFlags::CWR | TcpFlags::ECE | TcpFlags::URG).to_string(), "UECN");
        assert_eq!(TcpFlags(TcpFlags::RST).to_string(), "R");
        assert_eq!(TcpFlags::default().to_string(), "");
    }
}
