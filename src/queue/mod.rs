//! NFQUEUE packet processing engine.
//!
//! A [`PacketService`] supervises one queue driver per kernel queue id.
//! Each driver decodes delivered packets to the IP layer, runs them
//! through the hook pipeline assembled from plugins, and replies a
//! verdict to the kernel.

mod backend;
mod driver;
mod errors;
mod hooks;
mod packet;
mod plugin;
mod service;
#[cfg(test)]
pub(crate) mod testutil;
mod verdict;

pub use backend::{NfqBackend, QueueBackend, RawPacket};
pub use driver::{run_queue, NfqProcessor, PacketProcessor, ProcessorConfig, RunningQueue};
pub use errors::{
    errors_buffer, set_dump_packet_in_error, set_errors_buffer, set_show_packet_in_error,
};
pub use hooks::{HookResult, HookRunner, Hooks, PacketHook};
pub use packet::{Layer, Packet};
pub use plugin::Plugin;
pub use service::PacketService;
pub use verdict::Verdict;
