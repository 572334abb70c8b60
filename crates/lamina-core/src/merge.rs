//! Layer merging
//!
//! Folds an ordered layer stack into one combined table, later layers
//! taking precedence. Environment-conditional severities survive the merge
//! untouched; flattening them is the next stage's job.
//!
//! Per-field semantics:
//! - `rules`: presence wins, including an explicit `off` (which is an
//!   override, not a deletion); absence means no opinion.
//! - `globals`: union; on a mutability conflict the later layer wins whole.
//!   Environment-derived globals of a layer rank below its explicit block.
//! - `parser_options`: whole-value replacement, never deep-merged.
//! - `plugins`: union, deduplicated.

use indexmap::{IndexMap, IndexSet};

use crate::layer::{GlobalMutability, Layer, RuleEntrySpec, RuleKey, environment_globals};

/// A rule entry after merging, with the layer that contributed it
///
/// The layer name travels along for error attribution in later stages.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRule {
    pub spec: RuleEntrySpec,
    pub layer: String,
}

/// Combined-but-unflattened result of folding a layer stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedLayers {
    pub rules: IndexMap<RuleKey, MergedRule>,
    pub globals: IndexMap<String, GlobalMutability>,
    pub parser_options: Option<serde_json::Value>,
    pub plugins_required: IndexSet<String>,
}

impl MergedLayers {
    /// Fold one more layer on top of the accumulated result
    pub fn absorb(&mut self, layer: &Layer) {
        for env_name in layer.active_environments() {
            if let Some(idents) = environment_globals(env_name) {
                for ident in idents {
                    self.insert_global(ident, GlobalMutability::Readonly, &layer.name);
                }
            }
        }
        for (ident, mutability) in &layer.globals {
            self.insert_global(ident, *mutability, &layer.name);
        }

        for (key, spec) in &layer.rules {
            if let Some(previous) = self.rules.get(key) {
                tracing::debug!(
                    "rule '{key}': layer '{}' overrides layer '{}'",
                    layer.name,
                    previous.layer
                );
            }
            self.rules.insert(
                key.clone(),
                MergedRule {
                    spec: spec.clone(),
                    layer: layer.name.clone(),
                },
            );
        }

        if let Some(parser_options) = &layer.parser_options {
            if self.parser_options.is_some() {
                tracing::debug!("parser options replaced whole by layer '{}'", layer.name);
            }
            self.parser_options = Some(parser_options.clone());
        }

        for plugin in &layer.plugins {
            self.plugins_required.insert(plugin.clone());
        }
    }

    fn insert_global(&mut self, ident: &str, mutability: GlobalMutability, layer: &str) {
        if let Some(previous) = self.globals.get(ident) {
            if *previous != mutability {
                tracing::debug!(
                    "global '{ident}': mutability {previous:?} overridden with {mutability:?} by layer '{layer}'"
                );
            }
        }
        self.globals.insert(ident.to_string(), mutability);
    }
}

/// Fold a loaded layer stack left-to-right into one combined table
pub fn merge_layers(layers: &[Layer]) -> MergedLayers {
    let mut merged = MergedLayers::default();
    for layer in layers {
        merged.absorb(layer);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Severity;
    use serde_json::json;

    fn layer_with_rules(name: &str, rules: &[(&str, Severity)]) -> Layer {
        let mut layer = Layer::new(name);
        for (key, severity) in rules {
            layer
                .rules
                .insert(key.to_string(), RuleEntrySpec::fixed(*severity));
        }
        layer
    }

    #[test]
    fn test_later_layer_wins_rules() {
        let base = layer_with_rules("base", &[("ruleX", Severity::Error)]);
        let over = layer_with_rules("over", &[("ruleX", Severity::Off), ("ruleY", Severity::Warn)]);

        let merged = merge_layers(&[base, over]);

        assert_eq!(merged.rules.len(), 2);
        let rule_x = &merged.rules["ruleX"];
        assert_eq!(rule_x.spec, RuleEntrySpec::fixed(Severity::Off));
        assert_eq!(rule_x.layer, "over");
        assert_eq!(
            merged.rules["ruleY"].spec,
            RuleEntrySpec::fixed(Severity::Warn)
        );
    }

    #[test]
    fn test_absence_leaves_prior_value_untouched() {
        let base = layer_with_rules("base", &[("ruleX", Severity::Error)]);
        let over = layer_with_rules("over", &[("ruleY", Severity::Warn)]);

        let merged = merge_layers(&[base, over]);

        let rule_x = &merged.rules["ruleX"];
        assert_eq!(rule_x.spec, RuleEntrySpec::fixed(Severity::Error));
        assert_eq!(rule_x.layer, "base");
    }

    #[test]
    fn test_single_contributor_entry_unchanged() {
        let entry = RuleEntrySpec::with_options(Severity::Warn, json!({ "max": 120 }));
        let mut only = Layer::new("only");
        only.rules.insert("max-len".to_string(), entry.clone());

        let merged = merge_layers(&[Layer::new("empty"), only, Layer::new("later")]);

        assert_eq!(merged.rules["max-len"].spec, entry);
    }

    #[test]
    fn test_globals_union_with_later_mutability_winning() {
        let mut base = Layer::new("base");
        base.globals
            .insert("process".to_string(), GlobalMutability::Readonly);
        base.globals
            .insert("ga".to_string(), GlobalMutability::Readonly);

        let mut over = Layer::new("over");
        over.globals
            .insert("process".to_string(), GlobalMutability::Writable);

        let merged = merge_layers(&[base, over]);

        assert_eq!(merged.globals.len(), 2);
        assert_eq!(merged.globals["process"], GlobalMutability::Writable);
        assert_eq!(merged.globals["ga"], GlobalMutability::Readonly);
    }

    #[test]
    fn test_environment_globals_rank_below_explicit_block() {
        let mut layer = Layer::new("app");
        layer.env.insert("node".to_string(), true);
        // The node environment declares `process` readonly; the explicit
        // block upgrades it within the same layer.
        layer
            .globals
            .insert("process".to_string(), GlobalMutability::Writable);

        let merged = merge_layers(&[layer]);

        assert_eq!(merged.globals["process"], GlobalMutability::Writable);
        assert_eq!(merged.globals["require"], GlobalMutability::Readonly);
    }

    #[test]
    fn test_inactive_environment_contributes_nothing() {
        let mut layer = Layer::new("app");
        layer.env.insert("browser".to_string(), false);

        let merged = merge_layers(&[layer]);
        assert!(merged.globals.is_empty());
    }

    #[test]
    fn test_parser_options_replaced_whole() {
        let mut base = Layer::new("base");
        base.parser_options = Some(json!({ "parser": "ts-parser", "extraFileExtensions": [".vue"] }));

        let mut over = Layer::new("over");
        over.parser_options = Some(json!({ "ecmaVersion": 2021 }));

        let merged = merge_layers(&[base, over]);

        // No deep merge: the earlier keys are gone
        assert_eq!(merged.parser_options, Some(json!({ "ecmaVersion": 2021 })));
    }

    #[test]
    fn test_parser_options_absent_means_no_opinion() {
        let mut base = Layer::new("base");
        base.parser_options = Some(json!({ "ecmaVersion": 2021 }));

        let merged = merge_layers(&[base, Layer::new("over")]);
        assert_eq!(merged.parser_options, Some(json!({ "ecmaVersion": 2021 })));
    }

    #[test]
    fn test_plugins_union_deduplicated() {
        let mut base = Layer::new("base");
        base.plugins = vec!["fw".to_string(), "ts".to_string()];
        let mut over = Layer::new("over");
        over.plugins = vec!["fw".to_string(), "pug".to_string()];

        let merged = merge_layers(&[base, over]);

        let plugins: Vec<&str> = merged.plugins_required.iter().map(String::as_str).collect();
        assert_eq!(plugins, vec!["fw", "ts", "pug"]);
    }

    #[test]
    fn test_fold_is_associative_left_to_right() {
        let a = layer_with_rules("a", &[("ruleX", Severity::Error), ("ruleZ", Severity::Warn)]);
        let b = layer_with_rules("b", &[("ruleX", Severity::Off)]);
        let c = layer_with_rules("c", &[("ruleY", Severity::Warn), ("ruleZ", Severity::Error)]);

        let all_at_once = merge_layers(&[a.clone(), b.clone(), c.clone()]);

        let mut stepwise = merge_layers(&[a, b]);
        stepwise.absorb(&c);

        assert_eq!(all_at_once, stepwise);
    }
}
