//! Process-wide error-reporting knobs for queue drivers.
//!
//! All three values are set once at init and read-only afterwards.

use super::packet::Packet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Default capacity of the per-queue and merged error channels.
const DEFAULT_ERRORS_BUFFER: usize = 20;

static ERRORS_BUFFER: AtomicUsize = AtomicUsize::new(DEFAULT_ERRORS_BUFFER);
static SHOW_PACKET_IN_ERROR: AtomicBool = AtomicBool::new(false);
static DUMP_PACKET_IN_ERROR: AtomicBool = AtomicBool::new(false);

/// Capacity used when error channels are created. Never zero.
pub fn errors_buffer() -> usize {
    ERRORS_BUFFER.load(Ordering::Relaxed).max(1)
}

pub fn set_errors_buffer(size: usize) {
    ERRORS_BUFFER.store(size, Ordering::Relaxed);
}

/// When enabled, packet-scoped errors carry a one-line packet digest.
pub fn set_show_packet_in_error(enabled: bool) {
    SHOW_PACKET_IN_ERROR.store(enabled, Ordering::Relaxed);
}

/// When enabled, packet-scoped errors carry a full hex dump. Takes
/// precedence over the digest.
pub fn set_dump_packet_in_error(enabled: bool) {
    DUMP_PACKET_IN_ERROR.store(enabled, Ordering::Relaxed);
}

/// Appends the packet context selected by the process-wide toggles.
pub(crate) fn with_packet_context(packet: &Packet, msg: String) -> String {
    if DUMP_PACKET_IN_ERROR.load(Ordering::Relaxed) {
        format!("{msg}: [{}]", packet.dump())
    } else if SHOW_PACKET_IN_ERROR.load(Ordering::Relaxed) {
        format!("{msg}: [{}]", packet.digest())
    } else {
        msg
    }
}
