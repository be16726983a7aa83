//! Hook set specialized to the IP family.
//!
//! The generic pipeline resolves the IP header once per packet and the
//! runner fans it out to per-family callbacks, with the same
//! short-circuit semantics as the generic runner.

use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::queue::{HookResult, Packet, Verdict};
use crate::{Error, Result};
use std::time::SystemTime;

pub type Ipv4Hook =
    Box<dyn Fn(&Packet, &Ipv4Header<'_>, SystemTime) -> HookResult + Send + Sync>;
pub type Ipv6Hook =
    Box<dyn Fn(&Packet, &Ipv6Header<'_>, SystemTime) -> HookResult + Send + Sync>;
pub type TickHook = Box<dyn Fn(SystemTime, Option<SystemTime>) -> Result<()> + Send + Sync>;
pub type CloseHook = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Ordered per-family callbacks.
#[derive(Default)]
pub struct IpHooks {
    on_packet_v4: Vec<Ipv4Hook>,
    on_packet_v6: Vec<Ipv6Hook>,
    on_tick: Vec<TickHook>,
    on_close: Vec<CloseHook>,
}

impl IpHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_packet_v4<F>(&mut self, hook: F)
    where
        F: Fn(&Packet, &Ipv4Header<'_>, SystemTime) -> HookResult + Send + Sync + 'static,
    {
        self.on_packet_v4.push(Box::new(hook));
    }

    pub fn on_packet_v6<F>(&mut self, hook: F)
    where
        F: Fn(&Packet, &Ipv6Header<'_>, SystemTime) -> HookResult + Send + Sync + 'static,
    {
        self.on_packet_v6.push(Box::new(hook));
    }

    pub fn on_tick<F>(&mut self, hook: F)
    where
        F: Fn(SystemTime, Option<SystemTime>) -> Result<()> + Send + Sync + 'static,
    {
        self.on_tick.push(Box::new(hook));
    }

    pub fn on_close<F>(&mut self, hook: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.on_close.push(Box::new(hook));
    }
}

/// Executes an IP hook set. Invoked exactly once per packet per family
/// by the plugin's generic callback; errors of one evaluation are
/// joined into a single error.
pub struct IpHookRunner {
    hooks: IpHooks,
}

impl IpHookRunner {
    pub fn new(hooks: IpHooks) -> Self {
        Self { hooks }
    }

    pub fn packet_v4(&self, packet: &Packet, header: &Ipv4Header<'_>, ts: SystemTime) -> HookResult {
        let mut errors = Vec::new();
        let mut verdict = Verdict::Default;
        for callback in &self.hooks.on_packet_v4 {
            let result = callback(packet, header, ts);
            if let Some(error) = result.error {
                errors.push(error.to_string());
            }
            verdict = result.verdict;
            if verdict != Verdict::Default {
                break;
            }
        }
        finish(verdict, errors)
    }

    pub fn packet_v6(&self, packet: &Packet, header: &Ipv6Header<'_>, ts: SystemTime) -> HookResult {
        let mut errors = Vec::new();
        let mut verdict = Verdict::Default;
        for callback in &self.hooks.on_packet_v6 {
            let result = callback(packet, header, ts);
            if let Some(error) = result.error {
                errors.push(error.to_string());
            }
            verdict = result.verdict;
            if verdict != Verdict::Default {
                break;
            }
        }
        finish(verdict, errors)
    }

    pub fn tick(&self, last_tick: SystemTime, last_packet: Option<SystemTime>) -> Result<()> {
        let mut errors = Vec::new();
        for callback in &self.hooks.on_tick {
            if let Err(error) = callback(last_tick, last_packet) {
                errors.push(error.to_string());
            }
        }
        joined(errors)
    }

    pub fn close(&self) -> Result<()> {
        let mut errors = Vec::new();
        for callback in &self.hooks.on_close {
            if let Err(error) = callback() {
                errors.push(error.to_string());
            }
        }
        joined(errors)
    }
}

fn finish(verdict: Verdict, errors: Vec<String>) -> HookResult {
    if errors.is_empty() {
        HookResult::verdict(verdict)
    } else {
        HookResult::with_error(verdict, Error::Service(errors.join("; ")))
    }
}

fn joined(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Service(errors.join("; ")))
    }
}
