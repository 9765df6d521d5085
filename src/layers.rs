use std::net::IpAddr;

use etherparse::{
    Ethernet2HeaderSlice, InternetSlice, LinkSlice, SlicedPacket, TransportSlice, VlanSlice,
};
use log::debug;
use pcap::Linktype;

use crate::summary::TcpFlags;
use crate::CapturedPacket;

const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_VLAN: u16 = 0x8100;

/// Linux cooked capture header (`-i any`).
const SLL_HEADER_LEN: usize = 16;
/// Address family word in front of BSD loopback packets.
const LOOPBACK_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpLayer {
    pub source_port: u16,
    pub destination_port: u16,
    pub flags: TcpFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpLayer {
    pub source_port: u16,
    pub destination_port: u16,
}

/// Bytes left over once every recognized header has been peeled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload<'a> {
    Bytes(&'a [u8]),
    /// The frame could not be sliced past its link header, so where the
    /// payload starts is unknown.
    Malformed(String),
}

/// The layered view of one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layers<'a> {
    pub network: Option<(IpAddr, IpAddr)>,
    pub tcp: Option<TcpLayer>,
    pub udp: Option<UdpLayer>,
    /// Name of the highest protocol layer that could be recognized.
    pub highest: Option<&'static str>,
    pub payload: Option<RawPayload<'a>>,
    pub wire_len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Ethernet,
    /// Linux cooked header carrying this protocol number.
    Cooked(u16),
    Loopback,
    Ip,
}

impl Link {
    fn name(self) -> Option<&'static str> {
        match self {
            Link::Ethernet => Some("Ethernet"),
            Link::Cooked(ETHERTYPE_ARP) => Some("ARP"),
            Link::Cooked(_) => Some("SLL"),
            Link::Loopback => Some("Loopback"),
            Link::Ip => None,
        }
    }
}

impl<'a> Layers<'a> {
    pub fn dissect(packet: &'a CapturedPacket, linktype: Linktype) -> Layers<'a> {
        let data: &'a [u8] = &packet.data;
        let wire_len = packet.wire_len();

        // pcap_datalink reports DLT values, so raw IP shows up as 12 (14 on OpenBSD)
        let (link, frame) = match linktype {
            Linktype::ETHERNET => (Link::Ethernet, data),
            Linktype(12) | Linktype(14) | Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => (Link::Ip, data),
            Linktype::LINUX_SLL if data.len() >= SLL_HEADER_LEN => {
                let protocol = u16::from_be_bytes([data[14], data[15]]);
                (Link::Cooked(protocol), &data[SLL_HEADER_LEN..])
            }
            Linktype::NULL | Linktype::LOOP if data.len() >= LOOPBACK_HEADER_LEN => {
                (Link::Loopback, &data[LOOPBACK_HEADER_LEN..])
            }
            _ => {
                debug!("no dissector for link type {:?} ({} bytes)", linktype, data.len());
                return Layers { wire_len, ..Layers::default() };
            }
        };

        let sliced = match link {
            Link::Ethernet => SlicedPacket::from_ethernet(frame),
            Link::Cooked(protocol) => SlicedPacket::from_ether_type(protocol, frame),
            Link::Loopback | Link::Ip => SlicedPacket::from_ip(frame),
        };

        match sliced {
            Ok(sliced) => Self::from_sliced(sliced, frame.len(), link, wire_len),
            Err(err) if link == Link::Ethernet => {
                debug!("falling back to the link header: {:?}", err);
                Self::link_only(frame, wire_len, format!("{:?}", err))
            }
            Err(err) => {
                debug!("cannot slice packet: {:?}", err);
                Layers { highest: link.name(), wire_len, ..Layers::default() }
            }
        }
    }

    fn from_sliced(sliced: SlicedPacket<'a>, frame_len: usize, link: Link, wire_len: u32) -> Layers<'a> {
        let mut layers = Layers { wire_len, ..Layers::default() };

        let ether_type = match (&sliced.link, link) {
            (Some(LinkSlice::Ethernet2(eth)), _) => Some(eth.ether_type()),
            (_, Link::Cooked(protocol)) => Some(protocol),
            _ => None,
        };
        layers.highest = match ether_type {
            Some(ETHERTYPE_ARP) => Some("ARP"),
            _ => link.name(),
        };
        if sliced.vlan.is_some() {
            layers.highest = Some("802.1Q");
        }

        // bytes in front of the IP header, inside `frame`
        let mut header_len = 0;
        if let Some(LinkSlice::Ethernet2(eth)) = &sliced.link {
            header_len += eth.slice().len();
        }
        match &sliced.vlan {
            Some(VlanSlice::SingleVlan(vlan)) => header_len += vlan.slice().len(),
            Some(VlanSlice::DoubleVlan(vlan)) => header_len += vlan.slice().len(),
            None => {}
        }

        // the length the IP header declares, when it is usable
        let mut declared_len = None;
        match &sliced.ip {
            Some(InternetSlice::Ipv4(header, _)) => {
                layers.network = Some((header.source_addr().into(), header.destination_addr().into()));
                layers.highest = Some("IP");
                let total = usize::from(header.total_len());
                if total >= header.slice().len() {
                    declared_len = Some(total);
                }
            }
            Some(InternetSlice::Ipv6(header, _)) => {
                layers.network = Some((header.source_addr().into(), header.destination_addr().into()));
                layers.highest = Some("IPv6");
                // zero is used by jumbograms and segmentation offload
                if header.payload_length() != 0 {
                    declared_len = Some(header.slice().len() + usize::from(header.payload_length()));
                }
            }
            None => {}
        }

        match &sliced.transport {
            Some(TransportSlice::Tcp(tcp)) => {
                layers.tcp = Some(TcpLayer {
                    source_port: tcp.source_port(),
                    destination_port: tcp.destination_port(),
                    flags: TcpFlags::from_header(tcp),
                });
                layers.highest = Some("TCP");
            }
            Some(TransportSlice::Udp(udp)) => {
                layers.udp = Some(UdpLayer {
                    source_port: udp.source_port(),
                    destination_port: udp.destination_port(),
                });
                layers.highest = Some("UDP");
            }
            Some(TransportSlice::Icmpv4(_)) => layers.highest = Some("ICMP"),
            Some(TransportSlice::Icmpv6(_)) => layers.highest = Some("ICMPv6"),
            _ => {}
        }

        // link-layer trailer padding sits past the IP packet and is not payload
        let padding = declared_len
            .map(|declared| frame_len.saturating_sub(header_len).saturating_sub(declared))
            .unwrap_or(0);
        let rest: &'a [u8] = sliced.payload;
        let payload = &rest[..rest.len().saturating_sub(padding)];

        // ARP bodies belong to the ARP layer, not to a raw payload
        let arp = sliced.ip.is_none() && sliced.vlan.is_none() && ether_type == Some(ETHERTYPE_ARP);
        if !arp && !payload.is_empty() {
            layers.payload = Some(RawPayload::Bytes(payload));
        }
        layers
    }

    fn link_only(data: &'a [u8], wire_len: u32, reason: String) -> Layers<'a> {
        let mut layers = Layers { wire_len, ..Layers::default() };
        if let Ok(eth) = Ethernet2HeaderSlice::from_slice(data) {
            layers.highest = Some(match eth.ether_type() {
                ETHERTYPE_ARP => "ARP",
                ETHERTYPE_VLAN => "802.1Q",
                _ => "Ethernet",
            });
            if data.len() > eth.slice().len() {
                layers.payload = Some(RawPayload::Malformed(reason));
            }
        }
        layers
    }
}
