//! Configuration grid expansion.
//!
//! A grid is an ordered list of choice axes. Expansion yields the default
//! configuration followed by every combination of one value per axis merged
//! over the default, first axis outermost. Structural duplicates are dropped,
//! keeping the first occurrence.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::types::{CompositionOverride, ExperimentConfig, ParamValue};

/// One dimension of the configuration grid.
///
/// An axis table names exactly one target; extra keys are rejected rather
/// than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum GridAxis {
    /// Vary a plain engine parameter.
    Param {
        param: String,
        values: Vec<ParamValue>,
    },
    /// Vary the composition override.
    ModifyChem { modify_chem: Vec<CompositionOverride> },
    /// Vary the per-config exclusion list.
    Exclude { exclude: Vec<Vec<String>> },
    /// Vary the run modes.
    Modes { modes: Vec<Vec<String>> },
}

impl GridAxis {
    pub fn len(&self) -> usize {
        match self {
            GridAxis::Param { values, .. } => values.len(),
            GridAxis::ModifyChem { modify_chem } => modify_chem.len(),
            GridAxis::Exclude { exclude } => exclude.len(),
            GridAxis::Modes { modes } => modes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlay the `choice`-th value of this axis onto `config`.
    fn apply(&self, choice: usize, config: &mut ExperimentConfig) {
        match self {
            GridAxis::Param { param, values } => {
                config.params.insert(param.clone(), values[choice].clone());
            }
            GridAxis::ModifyChem { modify_chem } => {
                config.modify_chem = Some(modify_chem[choice].clone());
            }
            GridAxis::Exclude { exclude } => {
                config.exclude = exclude[choice].clone();
            }
            GridAxis::Modes { modes } => {
                config.modes = modes[choice].clone();
            }
        }
    }

    fn target(&self) -> &str {
        match self {
            GridAxis::Param { param, .. } => param,
            GridAxis::ModifyChem { .. } => "modify_chem",
            GridAxis::Exclude { .. } => "exclude",
            GridAxis::Modes { .. } => "modes",
        }
    }
}

/// Reject axes that would silently produce nothing or shadow each other.
pub fn validate_axes(axes: &[GridAxis]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, axis) in axes.iter().enumerate() {
        if axis.is_empty() {
            return Err(ConfigError::EmptyAxis { index });
        }
        let target = axis.target();
        if target.trim().is_empty() {
            return Err(ConfigError::EmptyAxisKey { index });
        }
        if !seen.insert(target.to_string()) {
            return Err(ConfigError::DuplicateAxis {
                key: target.to_string(),
            });
        }
    }
    Ok(())
}

/// Expand `default` over every combination of `axes`.
///
/// An empty `axes` list yields `[default]`.
pub fn expand(default: &ExperimentConfig, axes: &[GridAxis]) -> Vec<ExperimentConfig> {
    let lengths: Vec<usize> = axes.iter().map(GridAxis::len).collect();
    let mut configs = vec![default.clone()];
    for combination in index_product(&lengths) {
        let mut config = default.clone();
        for (axis, &choice) in axes.iter().zip(&combination) {
            axis.apply(choice, &mut config);
        }
        if !configs.contains(&config) {
            configs.push(config);
        }
    }
    configs
}

/// Cartesian product of `0..len` ranges, first range outermost.
fn index_product(lengths: &[usize]) -> Vec<Vec<usize>> {
    lengths.iter().fold(vec![Vec::new()], |prefixes, &len| {
        prefixes
            .iter()
            .flat_map(|prefix| {
                (0..len).map(move |choice| {
                    let mut next = prefix.clone();
                    next.push(choice);
                    next
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config
            .params
            .insert("Initial Pressure".to_string(), ParamValue::Number(5000.0));
        config
            .params
            .insert("log fo2 Path".to_string(), ParamValue::from("FMQ"));
        config.modes = vec!["Fractionate Solids".to_string()];
        config
    }

    fn param_axis(param: &str, values: &[f64]) -> GridAxis {
        GridAxis::Param {
            param: param.to_string(),
            values: values.iter().copied().map(ParamValue::Number).collect(),
        }
    }

    #[test]
    fn empty_grid_yields_only_default() {
        let default = default_config();
        assert_eq!(expand(&default, &[]), vec![default]);
    }

    #[test]
    fn combinations_follow_default_with_first_axis_outermost() {
        let default = default_config();
        let axes = vec![
            param_axis("Initial Pressure", &[1000.0, 2000.0]),
            param_axis("Initial Temperature", &[1200.0, 1300.0]),
        ];
        let configs = expand(&default, &axes);
        assert_eq!(configs.len(), 5);
        assert_eq!(configs[0], default);

        let pairs: Vec<(String, String)> = configs[1..]
            .iter()
            .map(|cfg| {
                (
                    cfg.params["Initial Pressure"].to_string(),
                    cfg.params["Initial Temperature"].to_string(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("1000".to_string(), "1200".to_string()),
                ("1000".to_string(), "1300".to_string()),
                ("2000".to_string(), "1200".to_string()),
                ("2000".to_string(), "1300".to_string()),
            ]
        );
        // Untouched keys are inherited from the default.
        assert!(configs[1..].iter().all(|cfg| cfg.modes == default.modes));
    }

    #[test]
    fn combination_equal_to_default_is_dropped() {
        let default = default_config();
        let axes = vec![param_axis("Initial Pressure", &[5000.0, 7000.0])];
        let configs = expand(&default, &axes);
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0], default);
        assert_eq!(
            configs[1].params["Initial Pressure"],
            ParamValue::Number(7000.0)
        );
    }

    #[test]
    fn size_is_bounded_by_product_plus_default() {
        let default = default_config();
        let axes = vec![
            param_axis("Initial Pressure", &[1000.0, 5000.0, 9000.0]),
            GridAxis::Modes {
                modes: vec![
                    vec!["Fractionate Solids".to_string()],
                    vec!["Isenthalpic".to_string()],
                ],
            },
        ];
        let configs = expand(&default, &axes);
        // 3 × 2 combinations, one of which reproduces the default.
        assert_eq!(configs.len(), 1 + 3 * 2 - 1);
    }

    #[test]
    fn typed_axes_replace_default_fields() {
        let default = default_config();
        let mut fixed = CompositionOverride::new();
        fixed.insert("H2O".to_string(), 2.0);
        let axes = vec![
            GridAxis::ModifyChem {
                modify_chem: vec![fixed.clone()],
            },
            GridAxis::Exclude {
                exclude: vec![vec!["CO2".to_string()]],
            },
        ];
        let configs = expand(&default, &axes);
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].modify_chem, Some(fixed));
        assert_eq!(configs[1].exclude, vec!["CO2".to_string()]);
    }

    #[test]
    fn validation_rejects_empty_and_duplicate_axes() {
        let err = validate_axes(&[param_axis("Initial Pressure", &[])]).unwrap_err();
        assert_eq!(err, ConfigError::EmptyAxis { index: 0 });

        let err = validate_axes(&[param_axis(" ", &[1.0])]).unwrap_err();
        assert_eq!(err, ConfigError::EmptyAxisKey { index: 0 });

        let err = validate_axes(&[
            param_axis("Initial Pressure", &[1.0]),
            param_axis("Initial Pressure", &[2.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAxis { .. }));
    }

    #[test]
    fn axes_parse_from_toml_tables() {
        #[derive(Deserialize)]
        struct Doc {
            grid: Vec<GridAxis>,
        }
        let doc: Doc = toml::from_str(
            r#"
[[grid]]
param = "Initial Pressure"
values = [1000, 2000]

[[grid]]
modify_chem = [{ H2O = 0.5 }, { H2O = 2.0 }]

[[grid]]
modes = [["Fractionate Solids"], ["Isothermal"]]
"#,
        )
        .expect("parse");
        assert!(matches!(doc.grid[0], GridAxis::Param { .. }));
        assert!(matches!(doc.grid[1], GridAxis::ModifyChem { .. }));
        assert!(matches!(doc.grid[2], GridAxis::Modes { .. }));
        assert_eq!(doc.grid[1].len(), 2);
    }

    #[test]
    fn axis_with_two_targets_is_rejected() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            grid: Vec<GridAxis>,
        }
        let parsed = toml::from_str::<Doc>(
            r#"
[[grid]]
param = "Initial Pressure"
values = [1000, 2000]
modes = [["Isothermal"]]
"#,
        );
        assert!(parsed.is_err());
    }
}
