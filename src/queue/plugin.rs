//! Packet processing plugins.

use super::hooks::Hooks;
use super::packet::Layer;

/// A named, class-typed bundle of packet actions.
pub trait Plugin: Send + Sync {
    /// Name of the plugin instance.
    fn name(&self) -> &str;

    /// Class name of the plugin.
    fn class(&self) -> &str;

    /// Attaches the plugin's callbacks to a packet source's hook set.
    ///
    /// Called exactly once per source. `source` identifies the queue
    /// (`nfqueue(#<qid>)`) for plugins that keep per-source state; a
    /// plugin registered into several sources must be stateless across
    /// them or carry its own synchronization.
    fn register(&self, source: &str, hooks: &mut Hooks);

    /// Layers required by the plugin.
    fn layers(&self) -> Vec<Layer>;

    /// Releases plugin resources at service shutdown.
    fn clean_up(&self) {}
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name())
            .field("class", &self.class())
            .finish()
    }
}
