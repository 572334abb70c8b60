//! Policy validation
//!
//! Checks the flattened candidate policy against the registry of installed
//! plugins: every required plugin must be available, every configured rule
//! key must be provided by some plugin, and rule options must satisfy the
//! schema the providing plugin declares for them.
//!
//! Validation is exhaustive, not fail-fast: all problems found in a run
//! are collected and reported together, so a caller can fix its
//! configuration in one pass. An empty policy passes — zero active rules
//! is a legitimate outcome.

use indexmap::IndexMap;
use jsonschema::Validator;

use crate::error::ResolveError;
use crate::layer::RuleKey;
use crate::policy::Policy;

/// Rules one plugin provides, with an optional options schema per rule
///
/// Option shapes are inherently heterogeneous across rules, so the engine
/// treats them as opaque values and defers interpretation to the schema
/// each rule's plugin declares.
#[derive(Debug, Clone, Default)]
pub struct PluginManifest {
    rules: IndexMap<RuleKey, Option<serde_json::Value>>,
}

impl PluginManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a rule without an options schema (options pass unchecked)
    pub fn rule(mut self, key: impl Into<String>) -> Self {
        self.rules.insert(key.into(), None);
        self
    }

    /// Declare a rule whose options must satisfy the given JSON Schema
    pub fn rule_with_schema(mut self, key: impl Into<String>, schema: serde_json::Value) -> Self {
        self.rules.insert(key.into(), Some(schema));
        self
    }

    pub fn provides(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn schema_for(&self, key: &str) -> Option<&serde_json::Value> {
        self.rules.get(key).and_then(Option::as_ref)
    }

    pub fn rule_keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

/// Source of per-rule option schemas
///
/// Consulted only by the validator.
pub trait RuleSchemaProvider {
    fn schema_for(&self, key: &str) -> Option<&serde_json::Value>;
}

/// The set of installed plugins and the rules they provide
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: IndexMap<String, PluginManifest>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an installed plugin's manifest
    pub fn register(&mut self, name: impl Into<String>, manifest: PluginManifest) {
        self.plugins.insert(name.into(), manifest);
    }

    /// Builder-style registration
    pub fn with_plugin(mut self, name: impl Into<String>, manifest: PluginManifest) -> Self {
        self.register(name, manifest);
        self
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn manifest(&self, name: &str) -> Option<&PluginManifest> {
        self.plugins.get(name)
    }

    /// Name of the plugin providing a rule, if any does
    pub fn provider_of(&self, key: &str) -> Option<&str> {
        self.plugins
            .iter()
            .find(|(_, manifest)| manifest.provides(key))
            .map(|(name, _)| name.as_str())
    }
}

impl RuleSchemaProvider for PluginRegistry {
    fn schema_for(&self, key: &str) -> Option<&serde_json::Value> {
        self.plugins
            .values()
            .find_map(|manifest| manifest.schema_for(key))
    }
}

/// Check a candidate policy against the plugin registry
///
/// Returns every problem found; an empty list confirms the policy.
pub fn validate_policy(policy: &Policy, registry: &PluginRegistry) -> Vec<ResolveError> {
    let mut errors = Vec::new();

    for plugin in policy.plugins_required() {
        if !registry.is_available(plugin) {
            errors.push(ResolveError::MissingPlugin {
                plugin: plugin.clone(),
            });
        }
    }

    for (key, entry) in policy.rules() {
        let layer = policy.origin_of(key).unwrap_or("unknown").to_string();

        if registry.provider_of(key).is_none() {
            errors.push(ResolveError::UnknownRule {
                layer,
                rule: key.clone(),
            });
            continue;
        }

        let (Some(options), Some(schema)) = (&entry.options, registry.schema_for(key)) else {
            continue;
        };
        match Validator::new(schema) {
            Ok(validator) => {
                if let Err(error) = validator.validate(options) {
                    errors.push(ResolveError::InvalidOptions {
                        layer,
                        rule: key.clone(),
                        message: format!("{error} at {}", error.instance_path()),
                    });
                }
            }
            Err(error) => {
                errors.push(ResolveError::InvalidOptions {
                    layer,
                    rule: key.clone(),
                    message: format!("plugin declared an invalid schema: {error}"),
                });
            }
        }
    }

    if errors.is_empty() {
        tracing::debug!(
            "policy validated: {} rule(s), {} plugin(s)",
            policy.rules().len(),
            policy.plugins_required().len()
        );
    } else {
        tracing::warn!("policy validation found {} problem(s)", errors.len());
    }

    errors
}
