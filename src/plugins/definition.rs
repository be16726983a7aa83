//! Declarative plugin definitions.
//!
//! Definitions are JSON files holding an array of plugin records; see
//! the `checkip`/`checkresolv` builders for the accepted `rules` and
//! `opts` values. Name uniqueness is enforced later by the builder.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Declarative description of a plugin instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginDef {
    /// Unique plugin name.
    pub name: String,
    /// Registered plugin class.
    pub class: String,
    pub disabled: bool,
    /// Role name to external-service name.
    pub services: HashMap<String, String>,
    /// Ordered action list.
    pub actions: Vec<ActionDef>,
    /// Free-form options interpreted by the class builder.
    pub opts: HashMap<String, serde_json::Value>,
}

/// Declarative description of an action, scoped under a plugin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionDef {
    /// Name, unique within the parent plugin.
    pub name: String,
    /// Registered action class.
    pub class: String,
    pub disabled: bool,
    /// Role name to external-service name.
    pub services: HashMap<String, String>,
    /// Rule branches keyed by selector (`when`).
    pub rules: Vec<RuleEntry>,
    /// Verdict applied when the action fails.
    #[serde(rename = "onerror")]
    pub on_error: String,
    /// Free-form options interpreted by the class builder.
    pub opts: HashMap<String, serde_json::Value>,
}

/// A rule branch and its selector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleEntry {
    pub when: String,
    pub rule: RuleDef,
}

/// Rule template applied when a branch is selected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleDef {
    /// Merge policy overrides embedded in the checker response reason.
    pub merge: bool,
    /// Event level name; empty raises no event.
    pub event: String,
    /// Log the check at info level.
    pub log: bool,
    /// Verdict name; empty means no opinion.
    pub verdict: String,
}

/// Parses a definition file holding a list of plugin records.
pub fn definitions_from_file(path: &Path) -> Result<Vec<PluginDef>> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("reading '{}': {e}", path.display())))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::Config(format!("parsing '{}': {e}", path.display())))
}

/// Loads definitions from explicit files, then from `.json` files
/// discovered in directories (entries sorted by name). File order is
/// preserved in the result.
pub fn load_definitions(files: &[PathBuf], dirs: &[PathBuf]) -> Result<Vec<PluginDef>> {
    let mut defs = Vec::new();
    for file in files {
        defs.extend(definitions_from_file(file)?);
    }
    for dir in dirs {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| Error::Config(format!("reading dir '{}': {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        for file in entries {
            defs.extend(definitions_from_file(&file)?);
        }
    }
    Ok(defs)
}
