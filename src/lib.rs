use pcap::{Linktype, Packet, PacketCodec, PacketHeader};

pub mod config;
pub mod layers;
pub mod payload;
pub mod session;
pub mod summary;

/// Represents an owned packet, as handed out by the capture backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    pub header: PacketHeader,
    pub data: Box<[u8]>
}

impl CapturedPacket {
    /// Builds a packet whose captured length equals its wire length.
    pub fn from_parts(ts: libc::timeval, data: &[u8]) -> Self {
        let len = data.len() as u32;
        CapturedPacket {
            header: PacketHeader { ts, caplen: len, len },
            data: data.into(),
        }
    }

    /// Length of the packet on the wire, which may exceed the captured bytes.
    pub fn wire_len(&self) -> u32 {
        self.header.len
    }

    pub fn as_packet(&self) -> Packet<'_> {
        Packet::new(&self.header, &self.data)
    }
}

impl From<Packet<'_>> for CapturedPacket {
    fn from(packet: Packet<'_>) -> Self {
        CapturedPacket {
            header: *packet.header,
            data: packet.data.into(),
        }
    }
}

pub struct OwnedCodec;

impl PacketCodec for OwnedCodec {
    type Item = CapturedPacket;
    fn decode(&mut self, packet: Packet) -> Self::Item {
        packet.into()
    }
}

/// The captured sequence: every packet of a session, in arrival order.
///
/// Nothing is ever evicted, so an unbounded capture grows until the process
/// exits or runs out of memory.
#[derive(Debug, Clone)]
pub struct Captured {
    pub linktype: Linktype,
    pub packets: Vec<CapturedPacket>,
}

impl Captured {
    pub fn new(linktype: Linktype) -> Self {
        Captured { linktype, packets: Vec::new() }
    }

    pub fn push(&mut self, packet: CapturedPacket) {
        self.packets.push(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
