//! Layer data model
//!
//! A [`Layer`] is one named, ordered unit of configuration: a rule table,
//! global declarations, parser options, plugin requirements, and activated
//! environments. Layers are immutable once loaded; a whole resolution run
//! operates on an ordered stack of them.
//!
//! Rule entries accept the shorthand shapes found in real-world config
//! files:
//!
//! ```jsonc
//! {
//!   "rules": {
//!     "quotes": ["warn", { "avoidEscape": true }],
//!     "no-param-reassign": 0,
//!     "no-debugger": { "when": { "flag": "isProd" }, "then": "error", "otherwise": "off" }
//!   }
//! }
//! ```

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ResolveError, Result};

/// Opaque, globally-unique identifier of a checkable condition
///
/// Equality is exact string match; namespaced ids (`fw/no-raw-html`) are
/// not interpreted by the engine.
pub type RuleKey = String;

/// Categorical enforcement level for a rule
///
/// The order is meaningful only when sorting reports; `error > warn > off`
/// carries no numeric semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Disable the rule. Explicitly `off` differs from absent: it still
    /// overrides lower-precedence layers.
    Off,
    /// Report without failing the run
    Warn,
    /// Report and fail the run
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Off => "off",
            Severity::Warn => "warn",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for Severity {
    /// Accepts the spelled forms and the legacy numeric aliases `0`/`1`/`2`
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SeverityVisitor;

        impl Visitor<'_> for SeverityVisitor {
            type Value = Severity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a severity: \"off\", \"warn\", \"error\", or 0, 1, 2")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Severity, E> {
                match value {
                    "off" => Ok(Severity::Off),
                    "warn" => Ok(Severity::Warn),
                    "error" => Ok(Severity::Error),
                    other => Err(E::custom(format!("invalid severity '{other}'"))),
                }
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Severity, E> {
                match value {
                    0 => Ok(Severity::Off),
                    1 => Ok(Severity::Warn),
                    2 => Ok(Severity::Error),
                    other => Err(E::custom(format!("invalid severity number {other}"))),
                }
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Severity, E> {
                u64::try_from(value)
                    .map_err(|_| E::custom(format!("invalid severity number {value}")))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Severity, E> {
                if value.fract() == 0.0 && (0.0..=2.0).contains(&value) {
                    self.visit_u64(value as u64)
                } else {
                    Err(E::custom(format!("invalid severity number {value}")))
                }
            }
        }

        deserializer.deserialize_any(SeverityVisitor)
    }
}

/// Mutability of a declared global identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GlobalMutability {
    /// Reads allowed, assignment is a violation
    Readonly,
    /// Reads and assignment allowed
    Writable,
}

/// A flag test evaluated against the caller-supplied environment flags
///
/// Without `equals` the flag must be a boolean; with `equals` it must be a
/// string compared for exact equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Name of the environment flag to test
    pub flag: String,
    /// String value the flag must equal; absent means boolean test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
}

/// A severity chosen by an environment flag at resolution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConditionalSeverity {
    /// Flag test deciding which branch applies
    pub when: Condition,
    /// Severity when the test holds
    pub then: Severity,
    /// Severity when the test does not hold
    pub otherwise: Severity,
}

/// A severity as written in a layer: fixed, or conditional on a flag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeveritySpec {
    Fixed(Severity),
    Conditional(ConditionalSeverity),
}

impl SeveritySpec {
    fn from_value(value: &serde_json::Value) -> std::result::Result<Self, String> {
        if let Some(obj) = value.as_object() {
            if obj.contains_key("when") {
                return serde_json::from_value(value.clone())
                    .map(SeveritySpec::Conditional)
                    .map_err(|e| e.to_string());
            }
            return Err("severity object must be a condition carrying 'when'".to_string());
        }
        serde_json::from_value(value.clone())
            .map(SeveritySpec::Fixed)
            .map_err(|e| e.to_string())
    }
}

impl From<Severity> for SeveritySpec {
    fn from(severity: Severity) -> Self {
        SeveritySpec::Fixed(severity)
    }
}

/// One rule's configuration within a layer: a severity spec plus opaque,
/// rule-specific options
///
/// The wire forms are the usual shorthands: a bare severity, or an array
/// whose first element is the severity and whose tail is the options. A
/// multi-element tail is kept as one array value, since options are opaque
/// to the engine and interpreted only by the rule's own schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEntrySpec {
    pub severity: SeveritySpec,
    pub options: Option<serde_json::Value>,
}

impl RuleEntrySpec {
    /// Entry with a fixed severity and no options
    pub fn fixed(severity: Severity) -> Self {
        Self {
            severity: SeveritySpec::Fixed(severity),
            options: None,
        }
    }

    /// Entry with a fixed severity and options
    pub fn with_options(severity: Severity, options: serde_json::Value) -> Self {
        Self {
            severity: SeveritySpec::Fixed(severity),
            options: Some(options),
        }
    }

    /// Entry whose severity is decided by an environment flag
    pub fn conditional(conditional: ConditionalSeverity) -> Self {
        Self {
            severity: SeveritySpec::Conditional(conditional),
            options: None,
        }
    }

    fn from_value(value: &serde_json::Value) -> std::result::Result<Self, String> {
        match value {
            serde_json::Value::Array(items) => {
                let (first, rest) = items
                    .split_first()
                    .ok_or_else(|| "rule entry array must not be empty".to_string())?;
                let severity = SeveritySpec::from_value(first)?;
                let options = match rest {
                    [] => None,
                    [single] => Some(single.clone()),
                    many => Some(serde_json::Value::Array(many.to_vec())),
                };
                Ok(Self { severity, options })
            }
            other => Ok(Self {
                severity: SeveritySpec::from_value(other)?,
                options: None,
            }),
        }
    }
}

impl Serialize for RuleEntrySpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match &self.options {
            None => self.severity.serialize(serializer),
            Some(options) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&self.severity)?;
                seq.serialize_element(options)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for RuleEntrySpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        RuleEntrySpec::from_value(&value).map_err(de::Error::custom)
    }
}

/// One named, ordered unit of rule/global/parser configuration
///
/// The `name` is not part of the wire format: presets are named by the
/// registry, inline layers by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Layer {
    #[serde(skip)]
    pub name: String,

    /// Rule table; duplicate keys within one layer are a load-time error
    #[serde(deserialize_with = "deserialize_unique_rules")]
    pub rules: IndexMap<RuleKey, RuleEntrySpec>,

    /// Explicitly declared globals
    pub globals: IndexMap<String, GlobalMutability>,

    /// Named environments contributing predefined read-only globals
    pub env: IndexMap<String, bool>,

    /// Parser configuration, opaque to the engine and replaced whole on merge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_options: Option<serde_json::Value>,

    /// Plugins this layer requires to be installed
    pub plugins: Vec<String>,
}

impl Layer {
    /// Create an empty layer with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a layer literal from JSON
    pub fn from_json(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let parsed = serde_json::from_str(source)
            .map_err(|e| ResolveError::malformed_layer(&name, e.to_string()));
        Self::finish(name, parsed)
    }

    /// Parse a layer literal from JSONC (comments and trailing commas)
    pub fn from_jsonc(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let parsed = json5::from_str(source)
            .map_err(|e| ResolveError::malformed_layer(&name, e.to_string()));
        Self::finish(name, parsed)
    }

    /// Parse a layer literal from YAML
    pub fn from_yaml(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let parsed = serde_yaml::from_str(source)
            .map_err(|e| ResolveError::malformed_layer(&name, e.to_string()));
        Self::finish(name, parsed)
    }

    fn finish(name: String, parsed: Result<Layer>) -> Result<Self> {
        let mut layer = parsed?;
        layer.name = name;
        layer.validate()?;
        Ok(layer)
    }

    /// Check structural requirements that serde cannot express
    ///
    /// Fails with [`ResolveError::MalformedLayer`] on empty rule keys or
    /// identifiers, and on activation of an unknown environment name.
    pub fn validate(&self) -> Result<()> {
        if self.rules.keys().any(|k| k.is_empty()) {
            return Err(ResolveError::malformed_layer(&self.name, "empty rule key"));
        }
        if self.globals.keys().any(|k| k.is_empty()) {
            return Err(ResolveError::malformed_layer(
                &self.name,
                "empty global identifier",
            ));
        }
        if self.plugins.iter().any(|p| p.is_empty()) {
            return Err(ResolveError::malformed_layer(&self.name, "empty plugin name"));
        }
        for env_name in self.env.keys() {
            if environment_globals(env_name).is_none() {
                return Err(ResolveError::malformed_layer(
                    &self.name,
                    format!("unknown environment '{env_name}'"),
                ));
            }
        }
        Ok(())
    }

    /// Names of environments this layer activates (declared `true`)
    pub fn active_environments(&self) -> impl Iterator<Item = &str> {
        self.env
            .iter()
            .filter(|(_, active)| **active)
            .map(|(name, _)| name.as_str())
    }
}

/// Reject duplicate rule keys instead of letting the last one silently win
fn deserialize_unique_rules<'de, D>(
    deserializer: D,
) -> std::result::Result<IndexMap<RuleKey, RuleEntrySpec>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RulesVisitor;

    impl<'de> Visitor<'de> for RulesVisitor {
        type Value = IndexMap<RuleKey, RuleEntrySpec>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of rule keys to rule entries")
        }

        fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            let mut rules = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, entry)) = access.next_entry::<RuleKey, RuleEntrySpec>()? {
                if rules.insert(key.clone(), entry).is_some() {
                    return Err(de::Error::custom(format!("duplicate rule key '{key}'")));
                }
            }
            Ok(rules)
        }
    }

    deserializer.deserialize_map(RulesVisitor)
}

const BROWSER_GLOBALS: &[&str] = &[
    "window",
    "document",
    "navigator",
    "location",
    "history",
    "console",
    "fetch",
    "localStorage",
    "sessionStorage",
    "setTimeout",
    "clearTimeout",
    "setInterval",
    "clearInterval",
];

const NODE_GLOBALS: &[&str] = &[
    "process",
    "require",
    "module",
    "exports",
    "__dirname",
    "__filename",
    "Buffer",
    "global",
    "console",
    "setTimeout",
    "clearTimeout",
    "setInterval",
    "clearInterval",
    "setImmediate",
];

const WORKER_GLOBALS: &[&str] = &[
    "self",
    "postMessage",
    "importScripts",
    "console",
    "setTimeout",
    "clearTimeout",
    "setInterval",
    "clearInterval",
];

const ES2015_GLOBALS: &[&str] = &[
    "Promise", "Symbol", "Map", "Set", "WeakMap", "WeakSet", "Proxy", "Reflect",
];

const ES2017_GLOBALS: &[&str] = &["Atomics", "SharedArrayBuffer"];

const ES2020_GLOBALS: &[&str] = &["BigInt", "BigInt64Array", "BigUint64Array", "globalThis"];

const ES2021_GLOBALS: &[&str] = &["AggregateError", "FinalizationRegistry", "WeakRef"];

/// Predefined read-only globals contributed by a named environment
///
/// The ECMAScript year environments are cumulative. Returns `None` for a
/// name the engine does not know; layers activating one fail load-time
/// validation.
pub fn environment_globals(name: &str) -> Option<Vec<&'static str>> {
    match name {
        "browser" => Some(BROWSER_GLOBALS.to_vec()),
        "node" => Some(NODE_GLOBALS.to_vec()),
        "worker" => Some(WORKER_GLOBALS.to_vec()),
        "es6" | "es2015" => Some(ES2015_GLOBALS.to_vec()),
        "es2017" => Some([ES2015_GLOBALS, ES2017_GLOBALS].concat()),
        "es2020" => Some([ES2015_GLOBALS, ES2017_GLOBALS, ES2020_GLOBALS].concat()),
        "es2021" => Some(
            [
                ES2015_GLOBALS,
                ES2017_GLOBALS,
                ES2020_GLOBALS,
                ES2021_GLOBALS,
            ]
            .concat(),
        ),
        _ => None,
    }
}
