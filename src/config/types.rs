//! Configuration types

use crate::queue::Verdict;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration (nfqfw.toml)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nfqueue: NfqueueConfig,
    pub log: LogConfig,
}

/// Settings of the nfqueue decision engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NfqueueConfig {
    /// Queue ids to attach to; unique, non-negative
    pub qids: Vec<i64>,
    /// Verdict applied when every hook abstains
    pub policy: String,
    /// Verdict applied on decoding errors
    #[serde(rename = "onerror")]
    pub on_error: String,
    /// Tick interval in seconds; 0 disables the tick worker
    pub tick_seconds: i64,
    /// CIDRs considered "inside"; actions skip or direct flows by them
    pub local_nets: Vec<String>,
    /// Directories scanned for `.json` plugin definitions
    pub plugin_dirs: Vec<PathBuf>,
    /// Explicit plugin definition files
    pub plugin_files: Vec<PathBuf>,
}

impl Default for NfqueueConfig {
    fn default() -> Self {
        Self {
            qids: vec![0],
            policy: "accept".to_string(),
            on_error: "drop".to_string(),
            tick_seconds: 5,
            local_nets: Vec::new(),
            plugin_dirs: Vec::new(),
            plugin_files: Vec::new(),
        }
    }
}

impl NfqueueConfig {
    /// Default policy verdict; never `Default`.
    pub fn policy_verdict(&self) -> Result<Verdict> {
        named_verdict(&self.policy)
    }

    /// On-error verdict; never `Default`. Independent from `policy`.
    pub fn on_error_verdict(&self) -> Result<Verdict> {
        named_verdict(&self.on_error)
    }

    /// Tick interval as a duration.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(0) as u64)
    }

    /// Queue ids narrowed to the kernel's id range. Call after
    /// validation; out-of-range ids are skipped.
    pub fn queue_ids(&self) -> Vec<u16> {
        self.qids
            .iter()
            .filter(|&&qid| (0..=i64::from(u16::MAX)).contains(&qid))
            .map(|&qid| qid as u16)
            .collect()
    }
}

fn named_verdict(name: &str) -> Result<Verdict> {
    match Verdict::from_name(name)? {
        Verdict::Default => Err(Error::Config(format!("invalid verdict value '{name}'"))),
        verdict => Ok(verdict),
    }
}
