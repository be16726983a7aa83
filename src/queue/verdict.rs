//! Firewall verdicts.

use crate::{Error, Result};
use std::fmt;

/// Decision a hook expresses for a packet.
///
/// `Default` means the hook has no opinion and the next one decides;
/// only `Accept` and `Drop` are valid replies to the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verdict {
    #[default]
    Default,
    Accept,
    Drop,
}

impl Verdict {
    /// Parses a verdict name used at configuration boundaries.
    pub fn from_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "default" => Ok(Verdict::Default),
            "accept" => Ok(Verdict::Accept),
            "drop" => Ok(Verdict::Drop),
            other => Err(Error::Config(format!("invalid verdict '{other}'"))),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Default => "default",
            Verdict::Accept => "accept",
            Verdict::Drop => "drop",
        };
        f.write_str(name)
    }
}
