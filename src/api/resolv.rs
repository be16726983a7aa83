//! DNS resolution cache client interface.

use crate::{Error, Result};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

/// Response of a resolution cache lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheResponse {
    /// True if the client previously resolved the address.
    pub result: bool,
    /// Time of the last matching resolution, when `result` is true.
    pub last: Option<SystemTime>,
    /// Time the cache entry was stored.
    pub store: Option<SystemTime>,
}

/// Client of a DNS resolution cache: answers whether `client` resolved
/// `resolved` through the local resolver.
///
/// Implementations must be safe for concurrent invocation and should
/// bound the latency of a single lookup.
pub trait ResolvChecker: Send + Sync {
    fn check(&self, client: IpAddr, resolved: IpAddr) -> Result<CacheResponse>;
}

/// Queries every checker for `(client, resolved)` in parallel and waits
/// for all of them. The first checker error fails the whole call.
pub fn check_parallel(
    checkers: &[Arc<dyn ResolvChecker>],
    client: IpAddr,
    resolved: IpAddr,
) -> Result<Vec<CacheResponse>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = checkers
            .iter()
            .map(|checker| scope.spawn(move || checker.check(client, resolved)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| Error::Service("resolv checker panicked".into()))?
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChecker(CacheResponse);

    impl ResolvChecker for FixedChecker {
        fn check(&self, _client: IpAddr, _resolved: IpAddr) -> Result<CacheResponse> {
            Ok(self.0)
        }
    }

    struct FailingChecker;

    impl ResolvChecker for FailingChecker {
        fn check(&self, _client: IpAddr, _resolved: IpAddr) -> Result<CacheResponse> {
            Err(Error::Service("unreachable".into()))
        }
    }

    #[test]
    fn test_parallel_collects_all() {
        let checkers: Vec<Arc<dyn ResolvChecker>> = vec![
            Arc::new(FixedChecker(CacheResponse {
                result: true,
                ..Default::default()
            })),
            Arc::new(FixedChecker(CacheResponse::default())),
        ];
        let responses =
            check_parallel(&checkers, "10.0.0.1".parse().unwrap(), "8.8.8.8".parse().unwrap())
                .unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses[0].result);
        assert!(!responses[1].result);
    }

    #[test]
    fn test_parallel_propagates_error() {
        let checkers: Vec<Arc<dyn ResolvChecker>> = vec![
            Arc::new(FixedChecker(CacheResponse::default())),
            Arc::new(FailingChecker),
        ];
        let result =
            check_parallel(&checkers, "10.0.0.1".parse().unwrap(), "8.8.8.8".parse().unwrap());
        assert!(result.is_err());
    }
}
