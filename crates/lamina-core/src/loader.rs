//! Preset resolution and layer loading
//!
//! A layer stack is declared as an ordered list of references: preset names
//! resolved through a [`PresetRegistry`], or inline layer literals. Loading
//! expands each preset's `extends` chain recursively, deepest parent first,
//! so that the preset's own layer lands last and takes precedence over
//! everything it pulls in.
//!
//! Extends chains form a directed acyclic graph; cycles are detected with
//! an explicit visited set and reported with the full chain.

use rayon::prelude::*;
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::{ResolveError, Result};
use crate::layer::Layer;

/// Fallback name for inline layers the caller left unnamed
const INLINE_LAYER_NAME: &str = "inline";

/// A reference to one entry of a layer stack
#[derive(Debug, Clone, PartialEq)]
pub enum LayerRef {
    /// A named preset, resolved through the registry
    Preset(String),
    /// A literal layer supplied by the caller
    Inline(Layer),
}

impl LayerRef {
    /// Reference a registry preset by name
    pub fn preset(name: impl Into<String>) -> Self {
        LayerRef::Preset(name.into())
    }
}

impl From<Layer> for LayerRef {
    fn from(layer: Layer) -> Self {
        LayerRef::Inline(layer)
    }
}

/// A registry-resolvable preset: its own layer plus the presets it extends
#[derive(Debug, Clone, Default)]
pub struct PresetDefinition {
    /// Presets merged beneath this one, in declaration order
    pub extends: Vec<String>,
    /// The preset's own contribution, applied on top of its parents
    pub layer: Layer,
}

impl PresetDefinition {
    pub fn new(layer: Layer) -> Self {
        Self {
            extends: Vec::new(),
            layer,
        }
    }

    pub fn with_extends<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extends = parents.into_iter().map(Into::into).collect();
        self
    }
}

/// Source of preset definitions
///
/// The sole supplier of presets for a resolution run; the engine never
/// mutates it. Typically backed by the set of installed rule-set packages.
pub trait PresetRegistry {
    /// Look up a preset by name; `None` means the name is not resolvable
    fn resolve(&self, name: &str) -> Option<&PresetDefinition>;
}

/// Preset registry backed by an in-memory map
///
/// Suitable for embedding and for tests; production callers usually adapt
/// their package installation layer to [`PresetRegistry`] instead.
#[derive(Debug, Default)]
pub struct InMemoryPresetRegistry {
    presets: IndexMap<String, PresetDefinition>,
}

impl InMemoryPresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preset, replacing any previous definition of the name
    pub fn insert(&mut self, name: impl Into<String>, definition: PresetDefinition) {
        self.presets.insert(name.into(), definition);
    }

    /// Builder-style registration
    pub fn with_preset(mut self, name: impl Into<String>, definition: PresetDefinition) -> Self {
        self.insert(name, definition);
        self
    }
}

impl PresetRegistry for InMemoryPresetRegistry {
    fn resolve(&self, name: &str) -> Option<&PresetDefinition> {
        self.presets.get(name)
    }
}

/// Loads and expands layer stack references against a preset registry
pub struct LayerLoader<'a, R: PresetRegistry + ?Sized> {
    registry: &'a R,
}

impl<'a, R: PresetRegistry + ?Sized> LayerLoader<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    /// Expand one stack reference into its concrete layers, in merge order
    ///
    /// An inline reference yields exactly one layer. A preset reference
    /// yields its transitive `extends` chain followed by the preset itself.
    pub fn load(&self, reference: &LayerRef) -> Result<Vec<Layer>> {
        match reference {
            LayerRef::Inline(layer) => {
                let mut layer = layer.clone();
                if layer.name.is_empty() {
                    layer.name = INLINE_LAYER_NAME.to_string();
                }
                layer.validate()?;
                Ok(vec![layer])
            }
            LayerRef::Preset(name) => {
                let mut expanded = Vec::new();
                let mut visiting = Vec::new();
                let mut seen = HashSet::new();
                self.expand_preset(name, &mut visiting, &mut seen, &mut expanded)?;
                Ok(expanded)
            }
        }
    }

    /// Load every reference of a stack, preserving declared order
    pub fn load_stack(&self, references: &[LayerRef]) -> Result<Vec<Layer>> {
        let mut layers = Vec::new();
        for reference in references {
            layers.extend(self.load(reference)?);
        }
        Ok(layers)
    }

    /// Load stack references in parallel
    ///
    /// Loading has no ordering dependency between references, only the
    /// merge afterwards does; the output keeps the declared order.
    pub fn load_stack_parallel(&self, references: &[LayerRef]) -> Result<Vec<Layer>>
    where
        R: Sync,
    {
        let loaded: Vec<Vec<Layer>> = references
            .par_iter()
            .map(|reference| self.load(reference))
            .collect::<Result<_>>()?;
        Ok(loaded.into_iter().flatten().collect())
    }

    fn expand_preset(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        seen: &mut HashSet<String>,
        out: &mut Vec<Layer>,
    ) -> Result<()> {
        if visiting.iter().any(|n| n == name) {
            let mut chain = visiting.clone();
            chain.push(name.to_string());
            return Err(ResolveError::cyclic_extends(&chain));
        }
        if !seen.insert(name.to_string()) {
            // Diamond in the extends graph; the first expansion already
            // contributed this preset's layer.
            tracing::debug!("preset '{name}' already expanded, skipping");
            return Ok(());
        }

        let definition = self
            .registry
            .resolve(name)
            .ok_or_else(|| ResolveError::unknown_preset(name))?;
        tracing::debug!(
            "resolved preset '{name}' ({} parent(s))",
            definition.extends.len()
        );

        visiting.push(name.to_string());
        for parent in &definition.extends {
            self.expand_preset(parent, visiting, seen, out)?;
        }
        visiting.pop();

        let mut layer = definition.layer.clone();
        layer.name = name.to_string();
        layer.validate()?;
        out.push(layer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{RuleEntrySpec, Severity};

    fn preset(rules: &[(&str, Severity)]) -> PresetDefinition {
        let mut layer = Layer::new("");
        for (key, severity) in rules {
            layer
                .rules
                .insert(key.to_string(), RuleEntrySpec::fixed(*severity));
        }
        PresetDefinition::new(layer)
    }

    #[test]
    fn test_load_inline_layer() {
        let registry = InMemoryPresetRegistry::new();
        let loader = LayerLoader::new(&registry);

        let mut layer = Layer::new("overrides");
        layer
            .rules
            .insert("no-console".to_string(), RuleEntrySpec::fixed(Severity::Warn));

        let loaded = loader.load(&LayerRef::from(layer)).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "overrides");
    }

    #[test]
    fn test_unnamed_inline_layer_gets_fallback_name() {
        let registry = InMemoryPresetRegistry::new();
        let loader = LayerLoader::new(&registry);

        let loaded = loader.load(&LayerRef::Inline(Layer::default())).unwrap();
        assert_eq!(loaded[0].name, "inline");
    }

    #[test]
    fn test_unknown_preset() {
        let registry = InMemoryPresetRegistry::new();
        let loader = LayerLoader::new(&registry);

        let result = loader.load(&LayerRef::preset("recommended"));
        assert!(matches!(
            result,
            Err(ResolveError::UnknownPreset { name }) if name == "recommended"
        ));
    }

    #[test]
    fn test_extends_chain_order() {
        // strict extends recommended extends base: base must land first,
        // strict last, so later entries win the merge.
        let registry = InMemoryPresetRegistry::new()
            .with_preset("base", preset(&[("no-console", Severity::Warn)]))
            .with_preset(
                "recommended",
                preset(&[("no-debugger", Severity::Warn)]).with_extends(["base"]),
            )
            .with_preset(
                "strict",
                preset(&[("no-debugger", Severity::Error)]).with_extends(["recommended"]),
            );
        let loader = LayerLoader::new(&registry);

        let loaded = loader.load(&LayerRef::preset("strict")).unwrap();
        let names: Vec<&str> = loaded.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["base", "recommended", "strict"]);
    }

    #[test]
    fn test_cyclic_extends_detected() {
        let registry = InMemoryPresetRegistry::new()
            .with_preset("a", preset(&[]).with_extends(["b"]))
            .with_preset("b", preset(&[]).with_extends(["a"]));
        let loader = LayerLoader::new(&registry);

        let result = loader.load(&LayerRef::preset("a"));
        match result {
            Err(ResolveError::CyclicExtends { chain }) => {
                assert_eq!(chain, "a -> b -> a");
            }
            other => panic!("expected CyclicExtends, got {other:?}"),
        }
    }

    #[test]
    fn test_self_extends_detected() {
        let registry =
            InMemoryPresetRegistry::new().with_preset("narcissus", preset(&[]).with_extends(["narcissus"]));
        let loader = LayerLoader::new(&registry);

        assert!(matches!(
            loader.load(&LayerRef::preset("narcissus")),
            Err(ResolveError::CyclicExtends { .. })
        ));
    }

    #[test]
    fn test_diamond_extends_expanded_once() {
        // a extends [left, right]; both extend base. base contributes once.
        let registry = InMemoryPresetRegistry::new()
            .with_preset("base", preset(&[("no-console", Severity::Warn)]))
            .with_preset("left", preset(&[]).with_extends(["base"]))
            .with_preset("right", preset(&[]).with_extends(["base"]))
            .with_preset("a", preset(&[]).with_extends(["left", "right"]));
        let loader = LayerLoader::new(&registry);

        let loaded = loader.load(&LayerRef::preset("a")).unwrap();
        let names: Vec<&str> = loaded.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["base", "left", "right", "a"]);
    }

    #[test]
    fn test_load_stack_preserves_declared_order() {
        let registry = InMemoryPresetRegistry::new()
            .with_preset("base", preset(&[("no-console", Severity::Warn)]))
            .with_preset("framework", preset(&[("fw/setup", Severity::Error)]));
        let loader = LayerLoader::new(&registry);

        let stack = vec![
            LayerRef::preset("base"),
            LayerRef::preset("framework"),
            LayerRef::Inline(Layer::new("overrides")),
        ];

        let sequential = loader.load_stack(&stack).unwrap();
        let parallel = loader.load_stack_parallel(&stack).unwrap();

        let names: Vec<&str> = sequential.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["base", "framework", "overrides"]);
        assert_eq!(sequential, parallel);
    }
}
