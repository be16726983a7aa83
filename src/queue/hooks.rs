//! Hook pipeline of a packet source.
//!
//! Plugins attach callbacks during registration (single-threaded); the
//! runner reads them afterwards from the driver threads. Insertion
//! order is observable: it determines evaluation order per layer and
//! the order layers are tried.

use super::packet::{Layer, Packet};
use super::verdict::Verdict;
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Outcome of a single packet hook.
///
/// The verdict and the error are orthogonal: a failing action still
/// votes its configured on-error verdict.
pub struct HookResult {
    pub verdict: Verdict,
    pub error: Option<Error>,
}

impl HookResult {
    pub fn verdict(verdict: Verdict) -> Self {
        Self {
            verdict,
            error: None,
        }
    }

    pub fn with_error(verdict: Verdict, error: Error) -> Self {
        Self {
            verdict,
            error: Some(error),
        }
    }
}

impl From<Verdict> for HookResult {
    fn from(verdict: Verdict) -> Self {
        Self::verdict(verdict)
    }
}

/// Callback invoked for every packet containing its layer.
pub type PacketHook = Arc<dyn Fn(&Packet, SystemTime) -> HookResult + Send + Sync>;
/// Callback invoked on every tick with the previous tick time and the
/// last packet time.
pub type TickHook = Arc<dyn Fn(SystemTime, Option<SystemTime>) -> crate::Result<()> + Send + Sync>;
/// Callback invoked when the source closes.
pub type CloseHook = Arc<dyn Fn() -> crate::Result<()> + Send + Sync>;

/// Ordered packet callbacks keyed by layer, plus tick and close
/// callbacks.
#[derive(Default)]
pub struct Hooks {
    layers: Vec<Layer>,
    on_packet: HashMap<Layer, Vec<PacketHook>>,
    sorted: Vec<(Layer, PacketHook)>,
    on_tick: Vec<TickHook>,
    on_close: Vec<CloseHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a packet callback for a layer.
    pub fn on_packet<F>(&mut self, layer: Layer, hook: F)
    where
        F: Fn(&Packet, SystemTime) -> HookResult + Send + Sync + 'static,
    {
        let hook: PacketHook = Arc::new(hook);
        if !self.on_packet.contains_key(&layer) {
            self.layers.push(layer);
        }
        self.on_packet.entry(layer).or_default().push(hook.clone());
        self.sorted.push((layer, hook));
    }

    /// Adds a tick callback.
    pub fn on_tick<F>(&mut self, hook: F)
    where
        F: Fn(SystemTime, Option<SystemTime>) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.on_tick.push(Arc::new(hook));
    }

    /// Adds a close callback.
    pub fn on_close<F>(&mut self, hook: F)
    where
        F: Fn() -> crate::Result<()> + Send + Sync + 'static,
    {
        self.on_close.push(Arc::new(hook));
    }

    /// Layers with at least one callback, in registration order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Packet callbacks for a layer, in insertion order.
    pub fn packet_hooks_by_layer(&self, layer: Layer) -> &[PacketHook] {
        self.on_packet.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Packet callbacks across all layers, in global insertion order.
    pub fn packet_hooks(&self) -> &[(Layer, PacketHook)] {
        &self.sorted
    }
}

/// Executes a hook set with short-circuit semantics.
pub struct HookRunner {
    layers: Vec<Layer>,
    on_packet: HashMap<Layer, Vec<PacketHook>>,
    on_tick: Vec<TickHook>,
    on_close: Vec<CloseHook>,
}

impl HookRunner {
    pub fn new(hooks: Hooks) -> Self {
        Self {
            layers: hooks.layers,
            on_packet: hooks.on_packet,
            on_tick: hooks.on_tick,
            on_close: hooks.on_close,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Runs the layer's callbacks in insertion order, stopping at the
    /// first non-Default verdict. Errors observed up to and including
    /// the deciding callback are returned alongside.
    pub fn packet(&self, layer: Layer, packet: &Packet, ts: SystemTime) -> (Verdict, Vec<Error>) {
        let mut errors = Vec::new();
        let Some(callbacks) = self.on_packet.get(&layer) else {
            return (Verdict::Default, errors);
        };
        for callback in callbacks {
            let result = callback(packet, ts);
            if let Some(error) = result.error {
                errors.push(error);
            }
            if result.verdict != Verdict::Default {
                return (result.verdict, errors);
            }
        }
        (Verdict::Default, errors)
    }

    /// Runs every tick callback, collecting errors.
    pub fn tick(&self, last_tick: SystemTime, last_packet: Option<SystemTime>) -> Vec<Error> {
        let mut errors = Vec::new();
        for callback in &self.on_tick {
            if let Err(error) = callback(last_tick, last_packet) {
                errors.push(error);
            }
        }
        errors
    }

    /// Runs every close callback, collecting errors.
    pub fn close(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for callback in &self.on_close {
            if let Err(error) = callback() {
                errors.push(error);
            }
        }
        errors
    }
}
