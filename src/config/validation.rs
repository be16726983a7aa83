//! Configuration validation

use super::{Config, NfqueueConfig};
use crate::protocol::IpCidr;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            eprintln!("[WARN] {}", warning);
        }
        for error in &self.errors {
            eprintln!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_nfqueue(&config.nfqueue, &mut result);
    result
}

fn validate_nfqueue(cfg: &NfqueueConfig, result: &mut ValidationResult) {
    for net in &cfg.local_nets {
        if IpCidr::parse(net).is_err() {
            result.error(format!("nfqueue.local_nets: '{net}' is not a valid CIDR"));
        }
    }

    for file in &cfg.plugin_files {
        if !file.is_file() {
            result.error(format!(
                "nfqueue.plugin_files: '{}' doesn't exist",
                file.display()
            ));
        }
    }
    for dir in &cfg.plugin_dirs {
        if !dir.is_dir() {
            result.error(format!(
                "nfqueue.plugin_dirs: '{}' doesn't exist",
                dir.display()
            ));
        }
    }

    if cfg.qids.is_empty() {
        result.error("nfqueue.qids: at least one queue id is required");
    }
    let mut seen = HashSet::new();
    for &qid in &cfg.qids {
        if !(0..=i64::from(u16::MAX)).contains(&qid) {
            result.error(format!("nfqueue.qids: invalid qid {qid}"));
        } else if !seen.insert(qid) {
            result.error(format!("nfqueue.qids: qid {qid} is repeated"));
        }
    }

    if !matches!(cfg.policy.as_str(), "accept" | "drop") {
        result.error(format!("nfqueue.policy: invalid value '{}'", cfg.policy));
    }
    if !matches!(cfg.on_error.as_str(), "accept" | "drop") {
        result.error(format!("nfqueue.onerror: invalid value '{}'", cfg.on_error));
    }

    if cfg.tick_seconds < 0 {
        result.error("nfqueue.tick_seconds: must not be negative");
    } else if cfg.tick_seconds == 0 {
        result.warn("nfqueue.tick_seconds: tick timer disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(nfqueue: NfqueueConfig) -> Config {
        Config {
            nfqueue,
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let result = validate(&Config::default());
        assert!(!result.has_errors());
    }

    #[test]
    fn test_rejects_empty_qids() {
        let result = validate(&config_with(NfqueueConfig {
            qids: Vec::new(),
            ..NfqueueConfig::default()
        }));
        assert!(result.has_errors());
    }

    #[test]
    fn test_rejects_negative_qid() {
        let result = validate(&config_with(NfqueueConfig {
            qids: vec![-1],
            ..NfqueueConfig::default()
        }));
        assert!(result.errors.iter().any(|e| e.contains("invalid qid")));
    }

    #[test]
    fn test_rejects_duplicate_qid() {
        let result = validate(&config_with(NfqueueConfig {
            qids: vec![1, 2, 1],
            ..NfqueueConfig::default()
        }));
        assert!(result.errors.iter().any(|e| e.contains("repeated")));
    }

    #[test]
    fn test_rejects_invalid_cidr() {
        let result = validate(&config_with(NfqueueConfig {
            local_nets: vec!["10.0.0.0/8".to_string(), "300.0.0.0/8".to_string()],
            ..NfqueueConfig::default()
        }));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("300.0.0.0/8"));
    }

    #[test]
    fn test_rejects_bad_verdicts() {
        let result = validate(&config_with(NfqueueConfig {
            policy: "reject".to_string(),
            on_error: "default".to_string(),
            ..NfqueueConfig::default()
        }));
        assert!(result.errors.iter().any(|e| e.contains("policy")));
        assert!(result.errors.iter().any(|e| e.contains("onerror")));
    }

    #[test]
    fn test_rejects_negative_tick() {
        let result = validate(&config_with(NfqueueConfig {
            tick_seconds: -5,
            ..NfqueueConfig::default()
        }));
        assert!(result.has_errors());
    }

    #[test]
    fn test_warns_on_disabled_tick() {
        let result = validate(&config_with(NfqueueConfig {
            tick_seconds: 0,
            ..NfqueueConfig::default()
        }));
        assert!(!result.has_errors());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_rejects_missing_plugin_file() {
        let result = validate(&config_with(NfqueueConfig {
            plugin_files: vec!["/nonexistent/plugins.json".into()],
            ..NfqueueConfig::default()
        }));
        assert!(result.has_errors());
    }
}
