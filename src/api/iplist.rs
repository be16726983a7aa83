//! IP reputation list client interface.

use crate::Result;
use std::net::IpAddr;

/// Response of a reputation lookup.
#[derive(Debug, Clone, Default)]
pub struct CheckResponse {
    /// True if the address is present in the list.
    pub result: bool,
    /// Free-form metadata. May embed a `[key=value,...]` policy record
    /// that actions merge into their rules (see [`crate::api::reason`]).
    pub reason: String,
}

/// Client of an IP reputation list.
///
/// Implementations must be safe for concurrent invocation and should
/// bound the latency of a single lookup; callers map any error to their
/// configured on-error verdict.
pub trait IpChecker: Send + Sync {
    fn check(&self, addr: IpAddr) -> Result<CheckResponse>;
}
