//! Interfaces of the external services consumed by packet actions.
//!
//! The clients themselves live outside this crate; actions only see the
//! traits defined here, resolved by name from a [`Services`] registry.

pub mod event;
pub mod iplist;
pub mod reason;
pub mod resolv;

use std::collections::HashMap;
use std::sync::Arc;

use self::event::Notifier;
use self::iplist::IpChecker;
use self::resolv::ResolvChecker;

/// Handle to an external classification service.
///
/// Opaque to the builder; consumers match the variant they expect and
/// reject anything else at build time.
#[derive(Clone)]
pub enum ApiService {
    IpList(Arc<dyn IpChecker>),
    ResolvCache(Arc<dyn ResolvChecker>),
    Notify(Arc<dyn Notifier>),
}

/// Named registry of external service handles.
#[derive(Default)]
pub struct Services {
    services: HashMap<String, ApiService>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service handle under a name. A later insert with the
    /// same name replaces the previous handle.
    pub fn insert(&mut self, name: &str, service: ApiService) {
        self.services.insert(name.to_string(), service);
    }

    /// Resolves a service handle by name.
    pub fn get(&self, name: &str) -> Option<ApiService> {
        self.services.get(name).cloned()
    }
}
