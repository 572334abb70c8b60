//! Resolution pipeline
//!
//! Drives one run through the stages
//! `Loading → Merging → ResolvingEnvironment → Validating`, ending in
//! `Ready` (a usable [`Policy`]) or `Failed` (the complete error list).
//!
//! Resolution is a pure function of (layer stack, environment flags,
//! installed plugins): no state is retained between runs, and a fresh
//! policy is derived each time. There are no automatic retries — every
//! failure is a configuration-authoring mistake, not a transient
//! condition — and no partial re-resolution: later stages assume
//! fully-valid output from earlier ones, so a caller fixes inputs and
//! re-runs the whole pipeline. Abandoning a run is just dropping it;
//! nothing is mutated in place.

use crate::env::{EnvironmentFlags, resolve_environment};
use crate::error::{ResolutionFailure, Stage};
use crate::loader::{LayerLoader, LayerRef, PresetRegistry};
use crate::merge::merge_layers;
use crate::policy::Policy;
use crate::validate::{PluginRegistry, validate_policy};

/// One-shot resolver from a declared layer stack to a [`Policy`]
pub struct PolicyResolver<'a, R: PresetRegistry + Sync> {
    presets: &'a R,
    plugins: &'a PluginRegistry,
    parallel_loading: bool,
}

impl<'a, R: PresetRegistry + Sync> PolicyResolver<'a, R> {
    pub fn new(presets: &'a R, plugins: &'a PluginRegistry) -> Self {
        Self {
            presets,
            plugins,
            parallel_loading: false,
        }
    }

    /// Load independent stack entries concurrently
    ///
    /// Merge order is unaffected; only pre-merge loading parallelizes.
    pub fn with_parallel_loading(mut self, enabled: bool) -> Self {
        self.parallel_loading = enabled;
        self
    }

    /// Run the full pipeline for one layer stack and flag snapshot
    pub fn resolve(
        &self,
        stack: &[LayerRef],
        flags: &EnvironmentFlags,
    ) -> Result<Policy, ResolutionFailure> {
        tracing::debug!(stage = %Stage::Loading, "loading {} stack entries", stack.len());
        let loader = LayerLoader::new(self.presets);
        let layers = if self.parallel_loading {
            loader.load_stack_parallel(stack)
        } else {
            loader.load_stack(stack)
        }
        .map_err(ResolutionFailure::from)?;

        tracing::debug!(stage = %Stage::Merging, "merging {} layers", layers.len());
        let merged = merge_layers(&layers);

        tracing::debug!(
            stage = %Stage::ResolvingEnvironment,
            "flattening {} rule entries",
            merged.rules.len()
        );
        let policy = resolve_environment(&merged, flags).map_err(ResolutionFailure::new)?;

        tracing::debug!(stage = %Stage::Validating, "checking candidate policy");
        let errors = validate_policy(&policy, self.plugins);
        if !errors.is_empty() {
            return Err(ResolutionFailure::new(errors));
        }

        tracing::debug!(
            "policy ready: {} rule(s), {} active",
            policy.rules().len(),
            policy.active_rules().count()
        );
        Ok(policy)
    }
}
