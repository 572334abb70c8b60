//! The final resolved policy
//!
//! A [`Policy`] is the flattened, validated configuration the downstream
//! analysis engine consumes read-only: every rule maps to exactly one
//! concrete entry, conditionals are gone, globals and plugin requirements
//! are settled. It is derived once per resolution run and never persisted
//! by the engine itself.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::layer::{GlobalMutability, RuleKey, Severity};

/// Fully resolved configuration of one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEntry {
    pub severity: Severity,
    /// Rule-specific options; absent means the rule's own defaults apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// The flattened, conflict-resolved configuration table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    rules: IndexMap<RuleKey, RuleEntry>,
    #[serde(skip)]
    origins: IndexMap<RuleKey, String>,
    globals: IndexMap<String, GlobalMutability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parser_options: Option<serde_json::Value>,
    plugins_required: IndexSet<String>,
}

impl Policy {
    pub(crate) fn from_parts(
        rules: IndexMap<RuleKey, RuleEntry>,
        origins: IndexMap<RuleKey, String>,
        globals: IndexMap<String, GlobalMutability>,
        parser_options: Option<serde_json::Value>,
        plugins_required: IndexSet<String>,
    ) -> Self {
        Self {
            rules,
            origins,
            globals,
            parser_options,
            plugins_required,
        }
    }

    /// All resolved rules in deterministic (first-mention) order
    pub fn rules(&self) -> &IndexMap<RuleKey, RuleEntry> {
        &self.rules
    }

    /// Entry for one rule, if any layer mentioned it
    pub fn rule(&self, key: &str) -> Option<&RuleEntry> {
        self.rules.get(key)
    }

    /// Resolved severity for one rule
    pub fn severity_of(&self, key: &str) -> Option<Severity> {
        self.rules.get(key).map(|entry| entry.severity)
    }

    /// Rules that are actually enforced (severity other than `off`)
    pub fn active_rules(&self) -> impl Iterator<Item = (&str, &RuleEntry)> {
        self.rules
            .iter()
            .filter(|(_, entry)| entry.severity != Severity::Off)
            .map(|(key, entry)| (key.as_str(), entry))
    }

    /// Layer that contributed the winning entry for a rule
    pub fn origin_of(&self, key: &str) -> Option<&str> {
        self.origins.get(key).map(String::as_str)
    }

    /// Declared globals, explicit and environment-derived
    pub fn globals(&self) -> &IndexMap<String, GlobalMutability> {
        &self.globals
    }

    /// Whether assignment to a global identifier is allowed
    pub fn is_writable(&self, ident: &str) -> bool {
        matches!(self.globals.get(ident), Some(GlobalMutability::Writable))
    }

    /// Parser configuration, opaque to the engine
    pub fn parser_options(&self) -> Option<&serde_json::Value> {
        self.parser_options.as_ref()
    }

    /// Union of plugin requirements across all layers
    pub fn plugins_required(&self) -> &IndexSet<String> {
        &self.plugins_required
    }

    /// A policy with zero rules is legitimate, if unusual
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
