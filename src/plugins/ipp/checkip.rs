//! Action `checkip`: looks up packet endpoints in an IP reputation
//! list and applies the matching rule branch.

use super::super::builder::{Builder, BuiltAction, Registry};
use super::super::definition::{ActionDef, RuleDef};
use super::hooks::IpHooks;
use super::{Action, PLUGIN_CLASS};
use crate::api::event::{self, Code, Event, Level};
use crate::api::iplist::{CheckResponse, IpChecker};
use crate::api::{reason, ApiService};
use crate::protocol::IpCidr;
use crate::queue::{HookResult, Verdict};
use crate::{Error, Result};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Class name of this action.
pub const ACTION_CLASS: &str = "checkip";

/// Event codes raised by this action.
pub const NET_LISTED_IP: Code = Code(10010);
pub const NET_UNLISTED_IP: Code = Code(10011);

/// Which endpoints are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Both,
    Src,
    Dst,
}

impl Mode {
    fn from_name(s: &str) -> Result<Self> {
        match s {
            "" | "both" => Ok(Mode::Both),
            "src" => Ok(Mode::Src),
            "dst" => Ok(Mode::Dst),
            other => Err(Error::Config(format!("invalid mode '{other}'"))),
        }
    }

    fn checks_src(self) -> bool {
        matches!(self, Mode::Both | Mode::Src)
    }

    fn checks_dst(self) -> bool {
        matches!(self, Mode::Both | Mode::Dst)
    }
}

/// Compiled rule applied when a branch is selected.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub merge: bool,
    pub event: Option<Level>,
    pub verdict: Verdict,
    pub log: bool,
}

impl Rule {
    fn from_def(def: &RuleDef) -> Result<Self> {
        Ok(Self {
            merge: def.merge,
            event: event::parse_level(&def.event)?,
            verdict: Verdict::from_name(&def.verdict)?,
            log: def.log,
        })
    }
}

/// Configuration for [`CheckIp`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub mode: Mode,
    pub local_nets: Vec<IpCidr>,
    pub when_listed: Rule,
    pub when_unlisted: Rule,
    pub on_error: Verdict,
}

/// Checks source/destination addresses against a reputation list.
pub struct CheckIp {
    name: String,
    mode: Mode,
    listed: Rule,
    unlisted: Rule,
    on_error: Verdict,
    local_nets: Vec<IpCidr>,
    checker: Arc<dyn IpChecker>,
}

impl CheckIp {
    pub fn new(name: &str, checker: Arc<dyn IpChecker>, cfg: Config) -> Self {
        Self {
            name: name.to_string(),
            mode: cfg.mode,
            listed: cfg.when_listed,
            unlisted: cfg.when_unlisted,
            on_error: cfg.on_error,
            local_nets: cfg.local_nets,
            checker,
        }
    }

    fn check(&self, src: IpAddr, dst: IpAddr) -> HookResult {
        let (response, checked) = match self.check_endpoints(src, dst) {
            Ok(outcome) => outcome,
            Err(error) => {
                return HookResult::with_error(
                    self.on_error,
                    Error::Action {
                        name: self.name.clone(),
                        reason: error.to_string(),
                    },
                );
            }
        };

        let mut rule = self.unlisted.clone();
        if response.result {
            rule = self.listed.clone();
            if rule.merge {
                rule = match merge_reason(&rule, &response.reason) {
                    Ok(merged) => merged,
                    Err(error) => {
                        return HookResult::with_error(
                            self.on_error,
                            Error::Action {
                                name: self.name.clone(),
                                reason: format!("merging reason: {error}"),
                            },
                        );
                    }
                };
            }
        }

        let decisive = checked.unwrap_or(src);
        if rule.log {
            info!(
                action = %self.name, %src, %dst, ip = %decisive,
                listed = response.result, reason = %response.reason,
                "ip list check"
            );
        }
        if let Some(level) = rule.event {
            let code = if response.result {
                NET_LISTED_IP
            } else {
                NET_UNLISTED_IP
            };
            let mut raised = Event::new(code, level);
            raised.set("name", decisive.to_string());
            raised.set("reason", reason::clean(&response.reason));
            raised.set("srcip", src.to_string());
            raised.set("dstip", dst.to_string());
            event::notify(raised);
        }
        HookResult::verdict(rule.verdict)
    }

    /// Checks endpoints in mode order. A listed result or a checker
    /// failure makes that endpoint decisive and stops the sequence.
    fn check_endpoints(
        &self,
        src: IpAddr,
        dst: IpAddr,
    ) -> Result<(CheckResponse, Option<IpAddr>)> {
        let mut response = CheckResponse::default();
        let mut checked = None;
        if self.mode.checks_src() && !self.is_local(src) {
            response = self
                .checker
                .check(src)
                .map_err(|e| Error::Service(format!("check {src}: {e}")))?;
            checked = Some(src);
            if response.result {
                return Ok((response, checked));
            }
        }
        if self.mode.checks_dst() && !self.is_local(dst) {
            response = self
                .checker
                .check(dst)
                .map_err(|e| Error::Service(format!("check {dst}: {e}")))?;
            checked = Some(dst);
        }
        Ok((response, checked))
    }

    fn is_local(&self, addr: IpAddr) -> bool {
        self.local_nets.iter().any(|net| net.contains(addr))
    }
}

impl Action for CheckIp {
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
            action.check(IpAddr::V4(header.src_addr()), IpAddr::V4(header.dst_addr()))
        });
        let action = self;
        hooks.on_packet_v6(move |_packet, header, _ts| {
            action.check(IpAddr::V6(header.src_addr()), IpAddr::V6(header.dst_addr()))
        });
    }
}

/// Overrides rule fields from the policy record embedded in the
/// checker's reason. Unknown keys are ignored.
fn merge_reason(rule: &Rule, raw: &str) -> Result<Rule> {
    let policy = reason::extract_policy(raw)?;
    let mut merged = rule.clone();
    if let Some(verdict) = policy.get("verdict") {
        merged.verdict = Verdict::from_name(verdict)?;
    }
    if let Some(level) = policy.get("event") {
        merged.event = event::parse_level(level)?;
    }
    if let Some(log) = policy.get("log") {
        if log == "true" {
            merged.log = true;
        }
    }
    Ok(merged)
}

/// Registers the action class.
pub(super) fn register(registry: &mut Registry) {
    registry.register_action(PLUGIN_CLASS, ACTION_CLASS, Arc::new(build));
}

fn build(b: &mut Builder, plugin_name: &str, def: &ActionDef) -> Result<BuiltAction> {
    let full_name = format!("{plugin_name}.{}", def.name);
    let checker = checker_service(b, def)?;
    let cfg = action_config(b, def)?;
    Ok(BuiltAction::Ip(Arc::new(CheckIp::new(
        &full_name, checker, cfg,
    ))))
}

fn checker_service(b: &Builder, def: &ActionDef) -> Result<Arc<dyn IpChecker>> {
    let Some(service_name) = def.services.get("xlist") else {
        return Err(Error::Config("'xlist' service is required".into()));
    };
    match b.api_service(service_name) {
        Some(ApiService::IpList(checker)) => Ok(checker),
        Some(_) => Err(Error::Config(format!(
            "service '{service_name}' is not an ip list"
        ))),
        None => Err(Error::Config(format!(
            "can't find service '{service_name}'"
        ))),
    }
}

fn action_config(b: &Builder, def: &ActionDef) -> Result<Config> {
    let mut cfg = Config {
        local_nets: b.local_nets(),
        ..Config::default()
    };
    for entry in &def.rules {
        match entry.when.as_str() {
            "listed" => cfg.when_listed = Rule::from_def(&entry.rule)?,
            "unlisted" => cfg.when_unlisted = Rule::from_def(&entry.rule)?,
            other => return Err(Error::Config(format!("unexpected rule when '{other}'"))),
        }
    }
    if !def.on_error.is_empty() {
        cfg.on_error = Verdict::from_name(&def.on_error)?;
    }
    if let Some(value) = def.opts.get("mode") {
        let Some(mode) = value.as_str() else {
            return Err(Error::Config("option 'mode' must be a string".into()));
        };
        cfg.mode = Mode::from_name(mode)?;
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockChecker {
        listed: Vec<IpAddr>,
        reason: String,
        fail: bool,
        calls: Mutex<Vec<IpAddr>>,
    }

    impl MockChecker {
        fn listing(listed: &[&str], reason: &str) -> Self {
            Self {
                listed: listed.iter().map(|ip| ip.parse().unwrap()).collect(),
                reason: reason.to_string(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                listed: Vec::new(),
                reason: String::new(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl IpChecker for MockChecker {
        fn check(&self, addr: IpAddr) -> Result<CheckResponse> {
            self.calls.lock().unwrap().push(addr);
            if self.fail {
                return Err(Error::Service("list unreachable".into()));
            }
            Ok(CheckResponse {
                result: self.listed.contains(&addr),
                reason: self.reason.clone(),
            })
        }
    }

    fn rule(verdict: Verdict) -> Rule {
        Rule {
            verdict,
            ..Rule::default()
        }
    }

    fn action(checker: Arc<MockChecker>, cfg: Config) -> CheckIp {
        CheckIp::new("netfilter.blocklist", checker, cfg)
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_listed_selects_listed_rule() {
        let checker = Arc::new(MockChecker::listing(&["8.8.8.8"], "bad"));
        let cfg = Config {
            when_listed: rule(Verdict::Drop),
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker.clone(), cfg);

        let result = action.check(addr("8.8.8.8"), addr("10.0.0.1"));
        assert_eq!(result.verdict, Verdict::Drop);
        assert!(result.error.is_none());
        // src was listed, dst never checked
        assert_eq!(*checker.calls.lock().unwrap(), vec![addr("8.8.8.8")]);
    }

    #[test]
    fn test_unlisted_selects_unlisted_rule() {
        let checker = Arc::new(MockChecker::listing(&[], ""));
        let cfg = Config {
            when_listed: rule(Verdict::Drop),
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker.clone(), cfg);

        let result = action.check(addr("1.1.1.1"), addr("9.9.9.9"));
        assert_eq!(result.verdict, Verdict::Accept);
        // both endpoints checked in mode both
        assert_eq!(checker.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_local_endpoints_skipped() {
        let checker = Arc::new(MockChecker::listing(&[], ""));
        let cfg = Config {
            local_nets: vec![IpCidr::parse("10.0.0.0/8").unwrap()],
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker.clone(), cfg);

        let result = action.check(addr("10.1.1.1"), addr("8.8.8.8"));
        assert_eq!(result.verdict, Verdict::Accept);
        assert_eq!(*checker.calls.lock().unwrap(), vec![addr("8.8.8.8")]);
    }

    #[test]
    fn test_mode_src_only() {
        let checker = Arc::new(MockChecker::listing(&[], ""));
        let cfg = Config {
            mode: Mode::Src,
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker.clone(), cfg);

        action.check(addr("1.1.1.1"), addr("9.9.9.9"));
        assert_eq!(*checker.calls.lock().unwrap(), vec![addr("1.1.1.1")]);
    }

    #[test]
    fn test_mode_dst_only() {
        let checker = Arc::new(MockChecker::listing(&[], ""));
        let cfg = Config {
            mode: Mode::Dst,
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker.clone(), cfg);

        action.check(addr("1.1.1.1"), addr("9.9.9.9"));
        assert_eq!(*checker.calls.lock().unwrap(), vec![addr("9.9.9.9")]);
    }

    #[test]
    fn test_checker_failure_yields_on_error() {
        let checker = Arc::new(MockChecker::failing());
        let cfg = Config {
            on_error: Verdict::Drop,
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker, cfg);

        let result = action.check(addr("1.1.1.1"), addr("9.9.9.9"));
        assert_eq!(result.verdict, Verdict::Drop);
        let error = result.error.unwrap().to_string();
        assert!(error.contains("netfilter.blocklist"));
        assert!(error.contains("list unreachable"));
    }

    #[test]
    fn test_merge_overrides_verdict_and_log() {
        let checker = Arc::new(MockChecker::listing(
            &["8.8.8.8"],
            "[verdict=drop,log=true]",
        ));
        let cfg = Config {
            when_listed: Rule {
                merge: true,
                verdict: Verdict::Accept,
                log: false,
                event: None,
            },
            when_unlisted: rule(Verdict::Accept),
            ..Config::default()
        };
        let action = action(checker, cfg);

        let result = action.check(addr("8.8.8.8"), addr("10.0.0.1"));
        assert_eq!(result.verdict, Verdict::Drop);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_merge_parse_failure_yields_on_error() {
        let checker = Arc::new(MockChecker::listing(&["8.8.8.8"], "[broken"));
        let cfg = Config {
            when_listed: Rule {
                merge: true,
                verdict: Verdict::Accept,
                ..Rule::default()
            },
            on_error: Verdict::Drop,
            ..Config::default()
        };
        let action = action(checker, cfg);

        let result = action.check(addr("8.8.8.8"), addr("10.0.0.1"));
        assert_eq!(result.verdict, Verdict::Drop);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_merge_ignored_without_flag() {
        let checker = Arc::new(MockChecker::listing(&["8.8.8.8"], "[verdict=accept]"));
        let cfg = Config {
            when_listed: rule(Verdict::Drop),
            ..Config::default()
        };
        let action = action(checker, cfg);

        let result = action.check(addr("8.8.8.8"), addr("10.0.0.1"));
        assert_eq!(result.verdict, Verdict::Drop);
    }

    #[test]
    fn test_merge_reason_unknown_keys_ignored() {
        let base = Rule {
            merge: true,
            verdict: Verdict::Accept,
            ..Rule::default()
        };
        let merged = merge_reason(&base, "[ttl=300,verdict=drop]").unwrap();
        assert_eq!(merged.verdict, Verdict::Drop);

        let merged = merge_reason(&base, "no policy at all").unwrap();
        assert_eq!(merged.verdict, Verdict::Accept);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(Mode::from_name("").unwrap(), Mode::Both);
        assert_eq!(Mode::from_name("both").unwrap(), Mode::Both);
        assert_eq!(Mode::from_name("src").unwrap(), Mode::Src);
        assert_eq!(Mode::from_name("dst").unwrap(), Mode::Dst);
        assert!(Mode::from_name("any").is_err());
    }
}
