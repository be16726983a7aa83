//! Shared helpers for queue tests: packet builders and an in-memory
//! kernel queue.

use super::backend::{QueueBackend, RawPacket};
use super::verdict::Verdict;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};

/// Minimal IPv4 packet (TCP, no options, 8 payload bytes).
pub(crate) fn ipv4_packet(src: &str, dst: &str) -> Vec<u8> {
    let src: Ipv4Addr = src.parse().unwrap();
    let dst: Ipv4Addr = dst.parse().unwrap();
    let mut packet = vec![
        0x45, 0x00, // Version=4, IHL=5
        0x00, 0x1c, // Total Length=28
        0x00, 0x01, // Identification
        0x00, 0x00, // Flags, Fragment Offset
        0x40, 0x06, // TTL=64, Protocol=6 (TCP)
        0x00, 0x00, // Checksum (not verified)
    ];
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());
    packet.extend_from_slice(&[0u8; 8]);
    packet
}

/// Minimal IPv6 packet (ICMPv6, 8 payload bytes).
pub(crate) fn ipv6_packet(src: &str, dst: &str) -> Vec<u8> {
    let src: Ipv6Addr = src.parse().unwrap();
    let dst: Ipv6Addr = dst.parse().unwrap();
    let mut packet = vec![
        0x60, 0x00, 0x00, 0x00, // Version=6
        0x00, 0x08, // Payload Length=8
        0x3a, 0x40, // Next Header=58, Hop Limit=64
    ];
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());
    packet.extend_from_slice(&[0u8; 8]);
    packet
}

/// In-memory queue: packets are injected through a channel, verdicts
/// are recorded for assertions.
pub(crate) struct MockBackend {
    pub incoming: Receiver<RawPacket>,
    pub verdicts: Arc<Mutex<Vec<(u32, Verdict)>>>,
}

impl QueueBackend for MockBackend {
    fn recv(&mut self) -> io::Result<Option<RawPacket>> {
        match self.incoming.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn verdict(&mut self, id: u32, verdict: Verdict) -> io::Result<()> {
        self.verdicts.lock().unwrap().push((id, verdict));
        Ok(())
    }
}

/// Waits until `verdicts` holds at least `count` entries.
pub(crate) fn wait_for_verdicts(
    verdicts: &Arc<Mutex<Vec<(u32, Verdict)>>>,
    count: usize,
) -> Vec<(u32, Verdict)> {
    for _ in 0..500 {
        {
            let seen = verdicts.lock().unwrap();
            if seen.len() >= count {
                return seen.clone();
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    verdicts.lock().unwrap().clone()
}
