//! Lamina Core
//!
//! Layered lint-policy resolution engine. Lamina takes an ordered stack of
//! configuration layers — registry presets with `extends` chains plus
//! inline overrides — and folds it into one final, conflict-resolved,
//! validated [`Policy`] for a downstream analysis engine to consume.
//!
//! The pipeline runs strictly forward:
//!
//! ```text
//! layer stack -> loader -> merger -> environment resolver -> validator -> Policy
//! ```
//!
//! Parsing source files, walking syntax trees, discovering plugins on disk
//! and CLI concerns are all external collaborators; this crate only decides
//! what the effective configuration *is*.
//!
//! ## Example
//!
//! ```
//! use lamina_core::{
//!     EnvironmentFlags, InMemoryPresetRegistry, Layer, LayerRef, PluginManifest,
//!     PluginRegistry, PolicyResolver, PresetDefinition, Severity,
//! };
//!
//! let presets = InMemoryPresetRegistry::new().with_preset(
//!     "recommended",
//!     PresetDefinition::new(
//!         Layer::from_json("", r#"{ "rules": { "no-console": "warn" } }"#).unwrap(),
//!     ),
//! );
//! let plugins =
//!     PluginRegistry::new().with_plugin("core", PluginManifest::new().rule("no-console"));
//!
//! let overrides =
//!     Layer::from_json("overrides", r#"{ "rules": { "no-console": "off" } }"#).unwrap();
//! let stack = vec![LayerRef::preset("recommended"), LayerRef::from(overrides)];
//!
//! let resolver = PolicyResolver::new(&presets, &plugins);
//! let policy = resolver.resolve(&stack, &EnvironmentFlags::new()).unwrap();
//! assert_eq!(policy.severity_of("no-console"), Some(Severity::Off));
//! ```

pub mod env;
pub mod error;
pub mod layer;
pub mod loader;
pub mod merge;
pub mod policy;
pub mod resolver;
pub mod validate;

// Re-export commonly used types
pub use env::{EnvironmentFlags, FlagValue, resolve_environment};
pub use error::{ResolutionFailure, ResolveError, Result, Stage};
pub use layer::{
    Condition, ConditionalSeverity, GlobalMutability, Layer, RuleEntrySpec, RuleKey, Severity,
    SeveritySpec, environment_globals,
};
pub use loader::{
    InMemoryPresetRegistry, LayerLoader, LayerRef, PresetDefinition, PresetRegistry,
};
pub use merge::{MergedLayers, MergedRule, merge_layers};
pub use policy::{Policy, RuleEntry};
pub use resolver::PolicyResolver;
pub use validate::{PluginManifest, PluginRegistry, RuleSchemaProvider, validate_policy};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lamina=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
