//! Builds live plugins and actions from declarative definitions.

use super::definition::{ActionDef, PluginDef};
use super::ipp;
use crate::api::{ApiService, Services};
use crate::protocol::IpCidr;
use crate::queue::Plugin;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Constructs a plugin from its definition.
pub type BuildPluginFn =
    Arc<dyn Fn(&mut Builder, &PluginDef) -> Result<Arc<dyn Plugin>> + Send + Sync>;
/// Constructs an action from its definition, scoped under a plugin.
pub type BuildActionFn =
    Arc<dyn Fn(&mut Builder, &str, &ActionDef) -> Result<BuiltAction> + Send + Sync>;

/// A built action, tagged by the hook family it registers into.
pub enum BuiltAction {
    Ip(Arc<dyn ipp::Action>),
}

/// Class-name registry for plugin and action constructors.
///
/// An explicit value, not process state: built-in classes come from
/// [`Registry::with_defaults`], embedders add their own before
/// building, tests create fresh registries per case.
#[derive(Default)]
pub struct Registry {
    plugins: HashMap<String, BuildPluginFn>,
    actions: HashMap<String, BuildActionFn>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in classes (`ipp` and its actions).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        ipp::register(&mut registry);
        registry
    }

    pub fn register_plugin(&mut self, class: &str, build: BuildPluginFn) {
        self.plugins.insert(class.to_string(), build);
    }

    /// Action classes are keyed `pluginclass.actionclass`.
    pub fn register_action(&mut self, plugin_class: &str, action_class: &str, build: BuildActionFn) {
        self.actions
            .insert(format!("{plugin_class}.{action_class}"), build);
    }

    fn plugin(&self, class: &str) -> Option<BuildPluginFn> {
        self.plugins.get(class).cloned()
    }

    fn action(&self, class: &str) -> Option<BuildActionFn> {
        self.actions.get(class).cloned()
    }
}

type LifecycleFn = Box<dyn FnMut() -> Result<()> + Send>;

/// Materializes plugins from definitions, resolving external service
/// handles by name and tracking lifecycle hooks.
pub struct Builder {
    registry: Registry,
    services: Services,
    data_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,

    plugins: HashSet<String>,
    plugin_list: Vec<Arc<dyn Plugin>>,
    actions: HashSet<String>,

    local_nets: Vec<IpCidr>,
    startup: Vec<LifecycleFn>,
    shutdown: Vec<LifecycleFn>,
}

impl Builder {
    pub fn new(registry: Registry, services: Services) -> Self {
        Self {
            registry,
            services,
            data_dir: None,
            cache_dir: None,
            plugins: HashSet::new(),
            plugin_list: Vec::new(),
            actions: HashSet::new(),
            local_nets: Vec::new(),
            startup: Vec::new(),
            shutdown: Vec::new(),
        }
    }

    /// Sets the base directory for relative data paths.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the base directory for relative cache paths.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Adds a CIDR to the local-network list consulted by actions.
    pub fn add_local_net(&mut self, cidr: &str) -> Result<()> {
        let net = IpCidr::parse(cidr)
            .map_err(|e| Error::Config(format!("adding localnet '{cidr}': {e}")))?;
        self.local_nets.push(net);
        Ok(())
    }

    /// Builds a plugin and records it. Rejects empty names, duplicates
    /// and disabled definitions.
    pub fn build_plugin(&mut self, def: &PluginDef) -> Result<Arc<dyn Plugin>> {
        debug!(name = %def.name, class = %def.class, "building plugin");
        if def.name.is_empty() {
            return Err(Error::Config("plugin name is required".into()));
        }
        if self.plugins.contains(&def.name) {
            return Err(build_err(&def.name, &def.class, "already exists"));
        }
        if def.disabled {
            return Err(build_err(&def.name, &def.class, "is disabled"));
        }
        let Some(build) = self.registry.plugin(&def.class) else {
            return Err(build_err(&def.name, &def.class, "no builder for class"));
        };
        let plugin = build(self, def).map_err(|e| match e {
            err @ Error::Build { .. } => err,
            err => build_err(&def.name, &def.class, &err.to_string()),
        })?;
        self.plugins.insert(def.name.clone());
        self.plugin_list.push(plugin.clone());
        Ok(plugin)
    }

    /// Builds an action scoped under `plugin_name`. The fully-qualified
    /// name `plugin.action` must be unique across the builder.
    pub fn build_action(
        &mut self,
        plugin_name: &str,
        plugin_class: &str,
        def: &ActionDef,
    ) -> Result<BuiltAction> {
        debug!(name = %def.name, class = %def.class, plugin = plugin_name, "building action");
        if def.name.is_empty() {
            return Err(Error::Config(format!(
                "action name is required in plugin '{plugin_name}'"
            )));
        }
        let full_name = format!("{plugin_name}.{}", def.name);
        let full_class = format!("{plugin_class}.{}", def.class);
        if self.actions.contains(&full_name) {
            return Err(build_err(&full_name, &full_class, "already exists"));
        }
        if def.disabled {
            return Err(build_err(&full_name, &full_class, "is disabled"));
        }
        let Some(build) = self.registry.action(&full_class) else {
            return Err(build_err(&full_name, &full_class, "no builder for class"));
        };
        let action = build(self, plugin_name, def).map_err(|e| match e {
            err @ Error::Build { .. } => err,
            err => build_err(&full_name, &full_class, &err.to_string()),
        })?;
        self.actions.insert(full_name);
        Ok(action)
    }

    /// Resolves a declared external service handle by name.
    pub fn api_service(&self, name: &str) -> Option<ApiService> {
        self.services.get(name)
    }

    /// Local networks registered so far.
    pub fn local_nets(&self) -> Vec<IpCidr> {
        self.local_nets.clone()
    }

    /// Resolves a path against the data directory; absolute paths pass
    /// through.
    pub fn data_path(&self, path: &str) -> PathBuf {
        resolve_path(self.data_dir.as_deref(), path)
    }

    /// Resolves a path against the cache directory; absolute paths
    /// pass through.
    pub fn cache_path(&self, path: &str) -> PathBuf {
        resolve_path(self.cache_dir.as_deref(), path)
    }

    /// Registers a hook run at service start, in registration order.
    pub fn on_startup<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.startup.push(Box::new(hook));
    }

    /// Registers a hook run at shutdown, in reverse registration order.
    pub fn on_shutdown<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.shutdown.push(Box::new(hook));
    }

    /// Runs the startup hooks; the first failure aborts.
    pub fn start(&mut self) -> Result<()> {
        info!("starting builder registered services");
        for hook in &mut self.startup {
            hook()?;
        }
        Ok(())
    }

    /// Releases every built plugin.
    pub fn clean_up(&self) {
        info!("cleaning up plugins");
        for plugin in &self.plugin_list {
            plugin.clean_up();
        }
    }

    /// Runs the shutdown hooks; failures are collected, not fatal.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("shutting down builder registered services");
        let mut failures = Vec::new();
        for hook in self.shutdown.iter_mut().rev() {
            if let Err(e) = hook() {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Service(failures.join("; ")))
        }
    }

    /// Built plugin by name.
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugin_list
            .iter()
            .find(|plugin| plugin.name() == name)
            .cloned()
    }

    /// Every built plugin, in build order.
    pub fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugin_list.clone()
    }
}

fn build_err(name: &str, class: &str, reason: &str) -> Error {
    Error::Build {
        name: name.to_string(),
        class: class.to_string(),
        reason: reason.to_string(),
    }
}

fn resolve_path(base: Option<&Path>, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base {
        Some(base) => base.join(path),
        None => path.to_path_buf(),
    }
}
