//! Security event publishing.
//!
//! Events are fire-and-forget records handed to a process-wide sink.
//! The default sink discards everything; the embedding process installs
//! a real publisher with [`set_notifier`].

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Numeric event code. Codes 10010-10013 are reserved by the built-in
/// actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(pub u32);

/// Severity of a raised event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Parses an event level name from a rule definition. The empty string
/// means "do not raise an event".
pub fn parse_level(s: &str) -> Result<Option<Level>> {
    match s.to_lowercase().as_str() {
        "" => Ok(None),
        "info" => Ok(Some(Level::Info)),
        "warn" => Ok(Some(Level::Warn)),
        "error" => Ok(Some(Level::Error)),
        "critical" => Ok(Some(Level::Critical)),
        other => Err(Error::Config(format!("invalid event level '{other}'"))),
    }
}

/// An event record published to the sink.
#[derive(Debug, Clone)]
pub struct Event {
    pub code: Code,
    pub level: Level,
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    pub fn new(code: Code, level: Level) -> Self {
        Self {
            code,
            level,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }
}

/// Event publisher. Must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// Sink that discards every event.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

static NOTIFIER: RwLock<Option<Arc<dyn Notifier>>> = RwLock::new(None);

/// Installs the process-wide event sink.
pub fn set_notifier(notifier: Arc<dyn Notifier>) {
    *NOTIFIER.write().unwrap() = Some(notifier);
}

/// Publishes an event to the installed sink, if any.
pub fn notify(event: Event) {
    if let Some(notifier) = NOTIFIER.read().unwrap().as_ref() {
        notifier.notify(event);
    }
}
