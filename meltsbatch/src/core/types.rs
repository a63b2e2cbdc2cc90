//! Shared deterministic types for batch planning.
//!
//! These types define the contract between grid expansion, naming and input
//! file rendering. They carry no I/O and compare structurally, which is what
//! grid deduplication and name stability rely on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single engine parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(value) => f.write_str(&format_number(*value)),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// Parameter name to value, one fully-resolved set of engine directives.
pub type ConfigRecord = BTreeMap<String, ParamValue>;

/// Component name to fixed wt% value, applied on top of a composition.
pub type CompositionOverride = BTreeMap<String, f64>;

/// Entries of the engine environment file (`KEY value`).
pub type EnvironmentSpec = BTreeMap<String, String>;

/// A starting composition in wt% per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Human label used as the leading segment of run names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub components: BTreeMap<String, f64>,
}

impl Composition {
    pub fn total(&self) -> f64 {
        self.components.values().sum()
    }
}

/// One run configuration before it is combined with a composition.
///
/// `modify_chem`, `exclude` and `modes` are resolved once when a run is
/// prepared; they never appear as engine parameters themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Keys omitted from the rendered input file for this configuration.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Positional run modes, rendered in order.
    pub modes: Vec<String>,
    pub params: ConfigRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify_chem: Option<CompositionOverride>,
}

/// One entry of the experiment set: a named config × composition pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub name: String,
    pub config: ExperimentConfig,
    pub composition: Composition,
    pub env: EnvironmentSpec,
}

/// A run whose directives have been resolved and is ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRun {
    pub name: String,
    pub params: ConfigRecord,
    pub components: BTreeMap<String, f64>,
    pub modes: Vec<String>,
    pub exclude: BTreeSet<String>,
}

/// Render a number without trailing zeros (`1300`, `0.25`, `47.8123`).
pub fn format_number(value: f64) -> String {
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
