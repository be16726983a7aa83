//! Action `checkresolv`: asks DNS resolution caches whether the
//! external peer of a local-to-remote flow was previously resolved by
//! the local endpoint.

use super::super::builder::{Builder, BuiltAction, Registry};
use super::super::definition::{ActionDef, RuleDef};
use super::hooks::IpHooks;
use super::{Action, PLUGIN_CLASS};
use crate::api::event::{self, Code, Event, Level};
use crate::api::resolv::{self, CacheResponse, ResolvChecker};
use crate::api::ApiService;
use crate::protocol::IpCidr;
use crate::queue::{HookResult, Verdict};
use crate::{Error, Result};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Class name of this action.
pub const ACTION_CLASS: &str = "checkresolv";

/// Event codes raised by this action.
pub const NET_RESOLVED_IP: Code = Code(10012);
pub const NET_UNRESOLVED_IP: Code = Code(10013);

/// Compiled rule applied when a branch is selected.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub event: Option<Level>,
    pub verdict: Verdict,
    pub log: bool,
}

impl Rule {
    fn from_def(def: &RuleDef) -> Result<Self> {
        Ok(Self {
            event: event::parse_level(&def.event)?,
            verdict: Verdict::from_name(&def.verdict)?,
            log: def.log,
        })
    }
}

/// Configuration for [`CheckResolv`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub local_nets: Vec<IpCidr>,
    pub when_resolved: Rule,
    pub when_unresolved: Rule,
    pub on_error: Verdict,
}

/// Checks crossing flows against a set of resolution caches.
pub struct CheckResolv {
    name: String,
    resolved: Rule,
    unresolved: Rule,
    on_error: Verdict,
    local_nets: Vec<IpCidr>,
    checkers: Vec<Arc<dyn ResolvChecker>>,
}

impl CheckResolv {
    pub fn new(
        name: &str,
        checkers: Vec<Arc<dyn ResolvChecker>>,
        cfg: Config,
    ) -> Result<Self> {
        if checkers.is_empty() {
            return Err(Error::Config(
                "at least one resolv checker is required".into(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            resolved: cfg.when_resolved,
            unresolved: cfg.when_unresolved,
            on_error: cfg.on_error,
            local_nets: cfg.local_nets,
            checkers,
        })
    }

    /// Only flows crossing the local-network boundary are checked; any
    /// other packet gets no opinion. `client` is the local endpoint,
    /// `server` the external one.
    fn on_packet(&self, src: IpAddr, dst: IpAddr) -> HookResult {
        let (client, server) = match (self.is_local(src), self.is_local(dst)) {
            (true, false) => (src, dst),
            (false, true) => (dst, src),
            _ => return HookResult::verdict(Verdict::Default),
        };
        let response = match self.check_resolved(client, server) {
            Ok(response) => response,
            Err(error) => {
                return HookResult::with_error(
                    self.on_error,
                    Error::Action {
                        name: self.name.clone(),
                        reason: format!("check {client},{server}: {error}"),
                    },
                );
            }
        };

        let rule = if response.result {
            &self.resolved
        } else {
            &self.unresolved
        };
        if rule.log {
            info!(
                action = %self.name, %src, %dst, resolv = %server,
                resolved = response.result,
                "resolution check"
            );
        }
        if let Some(level) = rule.event {
            let code = if response.result {
                NET_RESOLVED_IP
            } else {
                NET_UNRESOLVED_IP
            };
            let mut raised = Event::new(code, level);
            raised.set("srcip", src.to_string());
            raised.set("dstip", dst.to_string());
            raised.set("resolv", server.to_string());
            if response.result {
                raised.set("last", format_ts(response.last));
            } else {
                raised.set("store", format_ts(response.store));
            }
            event::notify(raised);
        }
        HookResult::verdict(rule.verdict)
    }

    /// Aggregates checker responses: the first affirmative wins;
    /// otherwise the response with the latest store time.
    fn check_resolved(&self, client: IpAddr, server: IpAddr) -> Result<CacheResponse> {
        if self.checkers.len() == 1 {
            return self.checkers[0].check(client, server);
        }
        let responses = resolv::check_parallel(&self.checkers, client, server)?;
        let mut winner = CacheResponse::default();
        for response in responses {
            if response.result {
                return Ok(response);
            }
            match (winner.store, response.store) {
                (None, Some(_)) => winner = response,
                (Some(current), Some(candidate)) if candidate > current => winner = response,
                _ => {}
            }
        }
        Ok(winner)
    }

    fn is_local(&self, addr: IpAddr) -> bool {
        self.local_nets.iter().any(|net| net.contains(addr))
    }
}

impl Action for CheckResolv {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        ACTION_CLASS
    }

    fn register_ip(self: Arc<Self>, hooks: &mut IpHooks) {
        debug!(action = %self.name, "registering ip hooks");
        let action = self.clone();
        hooks.on_packet_v4(move |_packet, header, _ts| {
            action.on_packet(IpAddr::V4(header.src_addr()), IpAddr::V4(header.dst_addr()))
        });
        let action = self;
        hooks.on_packet_v6(move |_packet, header, _ts| {
            action.on_packet(IpAddr::V6(header.src_addr()), IpAddr::V6(header.dst_addr()))
        });
    }
}

fn format_ts(ts: Option<SystemTime>) -> String {
    match ts.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
        Some(since_epoch) => since_epoch.as_secs().to_string(),
        None => "0".to_string(),
    }
}

/// Registers the action class.
pub(super) fn register(registry: &mut Registry) {
    registry.register_action(PLUGIN_CLASS, ACTION_CLASS, Arc::new(build));
}

fn build(b: &mut Builder, plugin_name: &str, def: &ActionDef) -> Result<BuiltAction> {
    let full_name = format!("{plugin_name}.{}", def.name);
    let checkers = checker_services(b, def)?;
    let cfg = action_config(b, def)?;
    Ok(BuiltAction::Ip(Arc::new(CheckResolv::new(
        &full_name, checkers, cfg,
    )?)))
}

fn checker_services(b: &Builder, def: &ActionDef) -> Result<Vec<Arc<dyn ResolvChecker>>> {
    if def.services.is_empty() {
        return Err(Error::Config("services required".into()));
    }
    let mut checkers = Vec::with_capacity(def.services.len());
    for service_name in def.services.values() {
        match b.api_service(service_name) {
            Some(ApiService::ResolvCache(checker)) => checkers.push(checker),
            Some(_) => {
                return Err(Error::Config(format!(
                    "service '{service_name}' is not a resolv checker"
                )));
            }
            None => {
                return Err(Error::Config(format!(
                    "can't find service '{service_name}'"
                )));
            }
        }
    }
    Ok(checkers)
}

fn action_config(b: &Builder, def: &ActionDef) -> Result<Config> {
    let mut cfg = Config {
        local_nets: b.local_nets(),
        ..Config::default()
    };
    for entry in &def.rules {
        match entry.when.as_str() {
            "resolved" => cfg.when_resolved = Rule::from_def(&entry.rule)?,
            "unresolved" => cfg.when_unresolved = Rule::from_def(&entry.rule)?,
            other => return Err(Error::Config(format!("unexpected rule when '{other}'"))),
        }
    }
    if !def.on_error.is_empty() {
        cfg.on_error = Verdict::from_name(&def.on_error)?;
    }
    Ok(cfg)
}
