//! IP-family plugin: bundles policy actions over the IPv4/IPv6 layers.
//!
//! The plugin registers one generic callback per family that resolves
//! the IP header once and dispatches to the actions' family hooks.

mod checkip;
mod checkresolv;
mod hooks;

pub use checkip::{CheckIp, Mode, NET_LISTED_IP, NET_UNLISTED_IP};
pub use checkresolv::{CheckResolv, NET_RESOLVED_IP, NET_UNRESOLVED_IP};
pub use hooks::{IpHookRunner, IpHooks};

use super::builder::{Builder, BuiltAction, Registry};
use super::definition::PluginDef;
use crate::queue::{HookResult, Hooks, Layer, Packet, Verdict};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::SystemTime;

/// Class name of the IP plugin.
pub const PLUGIN_CLASS: &str = "ipp";

/// Capability set of actions attached to the IP-family hooks:
/// identify, and register into the family hook set.
pub trait Action: Send + Sync {
    /// Name of the action instance (`plugin.action`).
    fn name(&self) -> &str;

    /// Class name of the action.
    fn class(&self) -> &str;

    /// Plugin class the action belongs to.
    fn plugin_class(&self) -> &str {
        PLUGIN_CLASS
    }

    /// Attaches the action's callbacks to the family hook set. The
    /// closures share ownership of the action.
    fn register_ip(self: Arc<Self>, hooks: &mut IpHooks);
}

/// IP plugin instance.
pub struct Plugin {
    name: String,
    runner: Arc<IpHookRunner>,
}

impl Plugin {
    pub fn new(name: &str, actions: Vec<Arc<dyn Action>>) -> Self {
        let mut hooks = IpHooks::new();
        for action in actions {
            action.register_ip(&mut hooks);
        }
        Self {
            name: name.to_string(),
            runner: Arc::new(IpHookRunner::new(hooks)),
        }
    }
}

impl crate::queue::Plugin for Plugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        PLUGIN_CLASS
    }

    fn register(&self, _source: &str, hooks: &mut Hooks) {
        let runner = self.runner.clone();
        hooks.on_packet(Layer::Ipv4, move |packet: &Packet, ts: SystemTime| {
            let Some(header) = packet.ipv4() else {
                return HookResult::with_error(
                    Verdict::Default,
                    Error::Parse("can't get ipv4 header".into()),
                );
            };
            runner.packet_v4(packet, &header, ts)
        });
        let runner = self.runner.clone();
        hooks.on_packet(Layer::Ipv6, move |packet: &Packet, ts: SystemTime| {
            let Some(header) = packet.ipv6() else {
                return HookResult::with_error(
                    Verdict::Default,
                    Error::Parse("can't get ipv6 header".into()),
                );
            };
            runner.packet_v6(packet, &header, ts)
        });
        let runner = self.runner.clone();
        hooks.on_tick(move |last_tick, last_packet| runner.tick(last_tick, last_packet));
        let runner = self.runner.clone();
        hooks.on_close(move || runner.close());
    }

    fn layers(&self) -> Vec<Layer> {
        vec![Layer::Ipv4, Layer::Ipv6]
    }

    fn clean_up(&self) {}
}

/// Registers the plugin class and its built-in action classes.
pub fn register(registry: &mut Registry) {
    registry.register_plugin(PLUGIN_CLASS, Arc::new(build));
    checkip::register(registry);
    checkresolv::register(registry);
}

fn build(b: &mut Builder, def: &PluginDef) -> Result<Arc<dyn crate::queue::Plugin>> {
    let mut actions: Vec<Arc<dyn Action>> = Vec::with_capacity(def.actions.len());
    for action_def in &def.actions {
        let BuiltAction::Ip(action) = b.build_action(&def.name, PLUGIN_CLASS, action_def)?;
        actions.push(action);
    }
    Ok(Arc::new(Plugin::new(&def.name, actions)))
}
