//! Error types for policy resolution

use std::fmt;
use thiserror::Error;

/// Result type for policy resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolving preset references and expanding `extends` chains
    Loading,
    /// Folding the layer stack into one table
    Merging,
    /// Flattening environment-conditional entries
    ResolvingEnvironment,
    /// Checking the candidate policy against the plugin registry
    Validating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::Merging => "merging",
            Stage::ResolvingEnvironment => "resolving-environment",
            Stage::Validating => "validating",
        };
        f.write_str(name)
    }
}

/// Errors produced while resolving a layer stack into a policy
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A preset name could not be resolved by the registry
    #[error("Unknown preset '{name}'")]
    UnknownPreset { name: String },

    /// A layer violated a structural requirement
    #[error("Malformed layer '{layer}': {message}")]
    MalformedLayer { layer: String, message: String },

    /// Preset `extends` chains reference each other
    #[error("Cyclic extends chain: {chain}")]
    CyclicExtends { chain: String },

    /// A conditional severity could not be evaluated against the flags
    #[error("Unresolvable condition for rule '{rule}' in layer '{layer}': {message}")]
    UnresolvableCondition {
        layer: String,
        rule: String,
        message: String,
    },

    /// A plugin required by the merged stack is not available
    #[error("Required plugin '{plugin}' is not available")]
    MissingPlugin { plugin: String },

    /// A rule key is not provided by any registered plugin
    #[error("Unknown rule '{rule}' (configured in layer '{layer}')")]
    UnknownRule { layer: String, rule: String },

    /// Rule options failed the schema declared by the rule's plugin
    #[error("Invalid options for rule '{rule}' (configured in layer '{layer}'): {message}")]
    InvalidOptions {
        layer: String,
        rule: String,
        message: String,
    },
}

impl ResolveError {
    /// Pipeline stage this error originated from
    pub fn stage(&self) -> Stage {
        match self {
            ResolveError::UnknownPreset { .. }
            | ResolveError::MalformedLayer { .. }
            | ResolveError::CyclicExtends { .. } => Stage::Loading,
            ResolveError::UnresolvableCondition { .. } => Stage::ResolvingEnvironment,
            ResolveError::MissingPlugin { .. }
            | ResolveError::UnknownRule { .. }
            | ResolveError::InvalidOptions { .. } => Stage::Validating,
        }
    }

    /// Name of the offending layer, if the error is attributable to one
    pub fn layer(&self) -> Option<&str> {
        match self {
            ResolveError::MalformedLayer { layer, .. }
            | ResolveError::UnresolvableCondition { layer, .. }
            | ResolveError::UnknownRule { layer, .. }
            | ResolveError::InvalidOptions { layer, .. } => Some(layer),
            _ => None,
        }
    }

    /// Offending rule key, if the error concerns a single rule
    pub fn rule_key(&self) -> Option<&str> {
        match self {
            ResolveError::UnresolvableCondition { rule, .. }
            | ResolveError::UnknownRule { rule, .. }
            | ResolveError::InvalidOptions { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// Whether this error aborts the run immediately
    ///
    /// Loader errors are fatal: a malformed or unresolvable layer cannot be
    /// merged. Environment and validation errors are collected so a run
    /// reports every problem at once.
    pub fn is_fatal(&self) -> bool {
        matches!(self.stage(), Stage::Loading | Stage::Merging)
    }

    /// Create an unknown-preset error
    pub fn unknown_preset(name: impl Into<String>) -> Self {
        Self::UnknownPreset { name: name.into() }
    }

    /// Create a malformed-layer error
    pub fn malformed_layer(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedLayer {
            layer: layer.into(),
            message: message.into(),
        }
    }

    /// Create a cyclic-extends error from the chain of preset names
    pub fn cyclic_extends(chain: &[String]) -> Self {
        Self::CyclicExtends {
            chain: chain.join(" -> "),
        }
    }

    /// Create an unresolvable-condition error
    pub fn unresolvable_condition(
        layer: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnresolvableCondition {
            layer: layer.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// A failed resolution run, carrying every collected error
///
/// A failed run never yields a partially-applied policy; callers get the
/// complete list and must fix inputs and re-run the whole pipeline.
#[derive(Debug)]
pub struct ResolutionFailure {
    pub errors: Vec<ResolveError>,
}

impl ResolutionFailure {
    pub fn new(errors: Vec<ResolveError>) -> Self {
        debug_assert!(!errors.is_empty(), "a failure must carry at least one error");
        Self { errors }
    }

    /// Stage of the first error, which is the stage the run stopped at
    pub fn stage(&self) -> Stage {
        self.errors
            .first()
            .map(ResolveError::stage)
            .unwrap_or(Stage::Loading)
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "policy resolution failed at stage '{}' with {} error(s):",
            self.stage(),
            self.errors.len()
        )?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionFailure {}

impl From<ResolveError> for ResolutionFailure {
    fn from(err: ResolveError) -> Self {
        Self::new(vec![err])
    }
}
