//! Packets delivered by a kernel queue.

use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::{Error, Result};
use std::fmt::Write as _;

/// Protocol layer a hook attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Ipv4,
    Ipv6,
}

/// A packet delivered by a kernel queue.
///
/// The wire buffer is immutable. The network family is resolved once at
/// decode time; header views are re-parsed from the buffer on demand.
#[derive(Debug)]
pub struct Packet {
    id: u32,
    payload: Vec<u8>,
    layer: Layer,
}

impl Packet {
    /// Decodes a delivered payload, trying IPv4 first and falling back
    /// to IPv6.
    pub fn decode(id: u32, payload: Vec<u8>) -> Result<Self> {
        let layer = if Ipv4Header::parse(&payload).is_ok() {
            Layer::Ipv4
        } else if Ipv6Header::parse(&payload).is_ok() {
            Layer::Ipv6
        } else {
            return Err(Error::Parse("payload is neither IPv4 nor IPv6".into()));
        };
        Ok(Self { id, payload, layer })
    }

    /// Delivery id assigned by the queue. Diagnostic only.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn has_layer(&self, layer: Layer) -> bool {
        self.layer == layer
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The IPv4 header, if this is an IPv4 packet.
    pub fn ipv4(&self) -> Option<Ipv4Header<'_>> {
        match self.layer {
            Layer::Ipv4 => Ipv4Header::parse(&self.payload).ok(),
            Layer::Ipv6 => None,
        }
    }

    /// The IPv6 header, if this is an IPv6 packet.
    pub fn ipv6(&self) -> Option<Ipv6Header<'_>> {
        match self.layer {
            Layer::Ipv6 => Ipv6Header::parse(&self.payload).ok(),
            Layer::Ipv4 => None,
        }
    }

    /// One-line summary used as error context.
    pub fn digest(&self) -> String {
        match self.layer {
            Layer::Ipv4 => match self.ipv4() {
                Some(h) => format!(
                    "IPv4 {} > {} proto {} len {}",
                    h.src_addr(),
                    h.dst_addr(),
                    h.protocol(),
                    self.payload.len()
                ),
                None => format!("IPv4 len {}", self.payload.len()),
            },
            Layer::Ipv6 => match self.ipv6() {
                Some(h) => format!(
                    "IPv6 {} > {} next {} len {}",
                    h.src_addr(),
                    h.dst_addr(),
                    h.next_header(),
                    self.payload.len()
                ),
                None => format!("IPv6 len {}", self.payload.len()),
            },
        }
    }

    /// Hex dump of the wire buffer, 16 bytes per line.
    pub fn dump(&self) -> String {
        let mut out = String::with_capacity(self.payload.len() * 3 + 16);
        for (i, chunk) in self.payload.chunks(16).enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{:04x}:", i * 16);
            for byte in chunk {
                let _ = write!(out, " {byte:02x}");
            }
        }
        out
    }
}
