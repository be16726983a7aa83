//! Kernel queue access.
//!
//! All NFQUEUE library use is confined to [`NfqBackend`]; the driver
//! and every test run against the [`QueueBackend`] trait.

use super::verdict::Verdict;
use crate::{Error, Result};
use std::io;

/// Kernel limits for an attached queue.
const MAX_PACKET_LEN: u16 = 0xFFFF;
const MAX_QUEUE_LEN: u32 = 0xFF;

/// A packet handed over by the kernel, pending exactly one verdict.
#[derive(Debug)]
pub struct RawPacket {
    /// Delivery id, unique per queue while the packet is pending.
    pub id: u32,
    pub payload: Vec<u8>,
}

/// Access to one kernel packet queue.
///
/// `recv` must not block indefinitely: `Ok(None)` means no packet is
/// currently ready. Every received packet must be answered through
/// `verdict` before the next `recv`.
pub trait QueueBackend: Send + 'static {
    fn recv(&mut self) -> io::Result<Option<RawPacket>>;
    fn verdict(&mut self, id: u32, verdict: Verdict) -> io::Result<()>;
}

/// NFQUEUE-backed implementation over the `nfq` crate.
pub struct NfqBackend {
    queue: nfq::Queue,
    qid: u16,
    pending: Option<nfq::Message>,
    next_id: u32,
}

impl NfqBackend {
    /// Attaches to queue `qid` in copy-packet mode.
    pub fn open(qid: u16) -> Result<Self> {
        let mut queue = nfq::Queue::open().map_err(|e| Error::Queue {
            qid,
            reason: format!("could not open nfqueue: {e}"),
        })?;
        queue.bind(qid).map_err(|e| Error::Queue {
            qid,
            reason: format!("could not bind nfqueue: {e}"),
        })?;
        queue.set_copy_range(qid, MAX_PACKET_LEN).map_err(|e| Error::Queue {
            qid,
            reason: format!("could not set copy range: {e}"),
        })?;
        queue.set_queue_max_len(qid, MAX_QUEUE_LEN).map_err(|e| Error::Queue {
            qid,
            reason: format!("could not set queue length: {e}"),
        })?;
        queue.set_nonblocking(true);
        Ok(Self {
            queue,
            qid,
            pending: None,
            next_id: 0,
        })
    }
}

impl QueueBackend for NfqBackend {
    fn recv(&mut self) -> io::Result<Option<RawPacket>> {
        match self.queue.recv() {
            Ok(message) => {
                self.next_id = self.next_id.wrapping_add(1);
                let payload = message.get_payload().to_vec();
                self.pending = Some(message);
                Ok(Some(RawPacket {
                    id: self.next_id,
                    payload,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn verdict(&mut self, _id: u32, verdict: Verdict) -> io::Result<()> {
        // Default never reaches the kernel; anything but Accept drops.
        let Some(mut message) = self.pending.take() else {
            return Ok(());
        };
        message.set_verdict(match verdict {
            Verdict::Accept => nfq::Verdict::Accept,
            Verdict::Drop | Verdict::Default => nfq::Verdict::Drop,
        });
        self.queue.verdict(message)
    }
}

impl Drop for NfqBackend {
    fn drop(&mut self) {
        let _ = self.queue.unbind(self.qid);
    }
}
