//! Environment resolution
//!
//! Conditional severities are a deliberately narrow form of dynamic
//! configuration: a pure, total function of the caller-supplied flag
//! snapshot, evaluated exactly once per rule at resolution time. Conditions
//! read flags only — never another rule's resolved value — so evaluation
//! order cannot matter. The result is an environment-free [`Policy`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::layer::{Condition, SeveritySpec};
use crate::merge::MergedLayers;
use crate::policy::{Policy, RuleEntry};

/// Value of one environment flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Str(String),
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Str(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Str(value)
    }
}

/// Caller-supplied snapshot of environment flags for one resolution run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentFlags {
    flags: IndexMap<String, FlagValue>,
}

impl EnvironmentFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style flag assignment
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FlagValue>) {
        self.flags.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }
}

/// Evaluate one flag test against the snapshot
///
/// Total over valid inputs: any missing flag or shape mismatch is an
/// `Err` with the reason, never a silent default.
fn evaluate_condition(condition: &Condition, flags: &EnvironmentFlags) -> Result<bool, String> {
    let value = flags
        .get(&condition.flag)
        .ok_or_else(|| format!("flag '{}' is not set", condition.flag))?;

    match (value, &condition.equals) {
        (FlagValue::Bool(b), None) => Ok(*b),
        (FlagValue::Bool(_), Some(_)) => Err(format!(
            "flag '{}' is boolean but the condition compares it to a string",
            condition.flag
        )),
        (FlagValue::Str(s), Some(expected)) => Ok(s == expected),
        (FlagValue::Str(_), None) => Err(format!(
            "flag '{}' is a string; the condition must carry 'equals'",
            condition.flag
        )),
    }
}

/// Flatten every conditional entry of the merged table into a concrete
/// [`Policy`]
///
/// Unresolvable conditions are collected across all rules, so one run
/// reports every authoring mistake in the flag wiring at once.
pub fn resolve_environment(
    merged: &MergedLayers,
    flags: &EnvironmentFlags,
) -> Result<Policy, Vec<ResolveError>> {
    let mut rules = IndexMap::new();
    let mut origins = IndexMap::new();
    let mut errors = Vec::new();

    for (key, merged_rule) in &merged.rules {
        let severity = match &merged_rule.spec.severity {
            SeveritySpec::Fixed(severity) => *severity,
            SeveritySpec::Conditional(conditional) => {
                match evaluate_condition(&conditional.when, flags) {
                    Ok(true) => conditional.then,
                    Ok(false) => conditional.otherwise,
                    Err(message) => {
                        errors.push(ResolveError::unresolvable_condition(
                            &merged_rule.layer,
                            key,
                            message,
                        ));
                        continue;
                    }
                }
            }
        };
        rules.insert(
            key.clone(),
            RuleEntry {
                severity,
                options: merged_rule.spec.options.clone(),
            },
        );
        origins.insert(key.clone(), merged_rule.layer.clone());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Policy::from_parts(
        rules,
        origins,
        merged.globals.clone(),
        merged.parser_options.clone(),
        merged.plugins_required.clone(),
    ))
}
