//! Policy records embedded in checker reason strings.
//!
//! A reputation response may carry one or more `[key=value,...]` blocks
//! that override rule fields on the consumer side, e.g.
//! `"malware c2 [verdict=drop,log=true]"`. Keys unknown to the consumer
//! are ignored; malformed blocks are an error.

use crate::{Error, Result};
use std::collections::HashMap;

/// Key/value pairs extracted from a reason string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    fields: HashMap<String, String>,
}

impl Policy {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Extracts every policy block from a reason string. Later blocks
/// override earlier ones on key collision.
pub fn extract_policy(reason: &str) -> Result<Policy> {
    let mut fields = HashMap::new();
    let mut rest = reason;
    while let Some(start) = rest.find('[') {
        let end = rest[start..]
            .find(']')
            .ok_or_else(|| Error::Parse("unterminated policy block in reason".into()))?;
        for item in rest[start + 1..start + end].split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| Error::Parse(format!("invalid policy item '{item}' in reason")))?;
            fields.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
        rest = &rest[start + end + 1..];
    }
    Ok(Policy { fields })
}

/// Returns the reason with policy blocks removed, trimmed.
pub fn clean(reason: &str) -> String {
    let mut out = String::with_capacity(reason.len());
    let mut rest = reason;
    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_policy() {
        let policy = extract_policy("[verdict=drop,log=true]").unwrap();
        assert_eq!(policy.get("verdict"), Some("drop"));
        assert_eq!(policy.get("log"), Some("true"));
        assert_eq!(policy.get("event"), None);
    }

    #[test]
    fn test_extract_policy_with_text() {
        let policy = extract_policy("listed by feed-x [verdict=accept] trailing").unwrap();
        assert_eq!(policy.get("verdict"), Some("accept"));
    }

    #[test]
    fn test_extract_policy_multiple_blocks() {
        let policy = extract_policy("[verdict=accept][verdict=drop,event=info]").unwrap();
        assert_eq!(policy.get("verdict"), Some("drop"));
        assert_eq!(policy.get("event"), Some("info"));
    }

    #[test]
    fn test_extract_policy_empty() {
        let policy = extract_policy("no blocks here").unwrap();
        assert!(policy.is_empty());
        assert!(extract_policy("[]").unwrap().is_empty());
    }

    #[test]
    fn test_extract_policy_malformed() {
        assert!(extract_policy("[verdict]").is_err());
        assert!(extract_policy("[verdict=drop").is_err());
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("listed [verdict=drop] by feed"), "listed  by feed");
        assert_eq!(clean("[verdict=drop]"), "");
        assert_eq!(clean("  plain reason "), "plain reason");
        assert_eq!(clean("broken [verdict=drop"), "broken");
    }
}
