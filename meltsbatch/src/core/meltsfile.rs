//! Rendering of the engine's native input and environment files.
//!
//! The engine parses these line by line, so directive spelling and the
//! `Name: value` layout must be reproduced exactly.

use super::composition::normalize;
use super::error::ConfigError;
use super::types::{EnvironmentSpec, PreparedRun, format_number};

/// File name of the environment file inside every run folder.
pub const ENV_FILE_NAME: &str = "environment.txt";

/// Extension of the rendered input file (`<name>.melts`).
pub const INPUT_EXTENSION: &str = "melts";

/// Parameters that the renderer owns and callers may not set.
pub const RESERVED_PARAMS: &[&str] = &["Title", "Initial Composition", "Mode"];

/// Known directives, in the order the engine documents them.
const DIRECTIVE_ORDER: &[&str] = &[
    "Initial Trace",
    "Initial Temperature",
    "Final Temperature",
    "Increment Temperature",
    "Initial Pressure",
    "Final Pressure",
    "Increment Pressure",
    "dp/dT",
    "Initial Volume",
    "Final Volume",
    "Increment Volume",
    "Initial Enthalpy",
    "Final Enthalpy",
    "Increment Enthalpy",
    "Initial Entropy",
    "Final Entropy",
    "Increment Entropy",
    "log fo2 Path",
    "log fo2 Delta",
    "Suppress",
];

/// Major-element components in engine order.
const COMPONENT_ORDER: &[&str] = &[
    "SiO2", "TiO2", "Al2O3", "Fe2O3", "Cr2O3", "FeO", "MnO", "MgO", "NiO", "CoO", "CaO", "Na2O",
    "K2O", "P2O5", "H2O", "CO2", "SO3", "Cl2O-1", "F2O-1",
];

/// File name of the input file for a run.
pub fn input_file_name(name: &str) -> String {
    format!("{name}.{INPUT_EXTENSION}")
}

/// Render `run` as an input file.
///
/// Excluded keys are dropped before the composition is renormalized to 100.
pub fn render_meltsfile(run: &PreparedRun) -> Result<String, ConfigError> {
    let kept: std::collections::BTreeMap<String, f64> = run
        .components
        .iter()
        .filter(|(component, _)| !run.exclude.contains(*component))
        .map(|(component, value)| (component.clone(), *value))
        .collect();
    let components = normalize(&kept).ok_or_else(|| ConfigError::NoRenderableComponents {
        name: run.name.clone(),
    })?;

    let mut lines = vec![format!("Title: {}", run.name)];

    let mut ordered: Vec<&String> = components.keys().collect();
    ordered.sort_by(|a, b| order_key(COMPONENT_ORDER, a).cmp(&order_key(COMPONENT_ORDER, b)));
    for component in ordered {
        lines.push(format!(
            "Initial Composition: {} {}",
            component,
            format_number(components[component])
        ));
    }

    let mut directives: Vec<&String> = run
        .params
        .keys()
        .filter(|key| !run.exclude.contains(*key))
        .filter(|key| !RESERVED_PARAMS.contains(&key.as_str()))
        .collect();
    directives.sort_by(|a, b| order_key(DIRECTIVE_ORDER, a).cmp(&order_key(DIRECTIVE_ORDER, b)));
    for key in directives {
        lines.push(format!("{}: {}", key, run.params[key]));
    }

    for mode in &run.modes {
        lines.push(format!("Mode: {mode}"));
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    Ok(rendered)
}

/// Render the environment file, one `KEY value` line per entry.
pub fn render_envfile(env: &EnvironmentSpec) -> String {
    let mut rendered = String::new();
    for (key, value) in env {
        rendered.push_str(key);
        rendered.push(' ');
        rendered.push_str(value);
        rendered.push('\n');
    }
    rendered
}

/// Known names sort by their documented position, unknown names after them by name.
fn order_key<'a>(order: &[&str], name: &'a str) -> (usize, &'a str) {
    let position = order
        .iter()
        .position(|known| *known == name)
        .unwrap_or(order.len());
    (position, name)
}
