//! Policy plugins and their declarative builder.
//!
//! Plugins are materialized from JSON definitions by a [`Builder`]
//! holding a class-name [`Registry`]; the built-in `ipp` family checks
//! packet endpoints against external classification services.

mod builder;
mod definition;
pub mod ipp;

pub use builder::{BuildActionFn, BuildPluginFn, Builder, BuiltAction, Registry};
pub use definition::{
    definitions_from_file, load_definitions, ActionDef, PluginDef, RuleDef, RuleEntry,
};
