//! Experiment set construction and per-run preparation.
//!
//! Planning is pure and eager: every configuration defect that would affect
//! the whole batch (bad axes, empty compositions, name collisions) is found
//! here, before any folder or process exists.

use std::collections::{BTreeSet, HashMap};

use super::composition::{apply_override, check_value};
use super::error::ConfigError;
use super::grid::{GridAxis, expand, validate_axes};
use super::meltsfile::RESERVED_PARAMS;
use super::naming::run_name;
use super::types::{Composition, EnvironmentSpec, Experiment, ExperimentConfig, PreparedRun};

/// Build the experiment set: every grid configuration × every composition.
///
/// Grid configurations form the outer loop, compositions the inner one.
pub fn build_experiment_set(
    default: &ExperimentConfig,
    axes: &[GridAxis],
    compositions: &[Composition],
    env: &EnvironmentSpec,
) -> Result<Vec<Experiment>, ConfigError> {
    validate_axes(axes)?;
    validate_compositions(compositions)?;

    let configs = expand(default, axes);
    for config in &configs {
        validate_config(config)?;
    }

    let mut experiments = Vec::with_capacity(configs.len() * compositions.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for config in &configs {
        for composition in compositions {
            let name = run_name(config, composition);
            let index = experiments.len();
            if let Some(&first) = seen.get(&name) {
                return Err(ConfigError::NameCollision {
                    name,
                    first,
                    second: index,
                });
            }
            seen.insert(name.clone(), index);
            experiments.push(Experiment {
                name,
                config: config.clone(),
                composition: composition.clone(),
                env: env.clone(),
            });
        }
    }
    Ok(experiments)
}

/// Resolve the typed directives of `experiment` into a renderable run.
///
/// Applies the composition override (renormalizing unmodified components)
/// and merges the config's exclusions with the batch-level ones.
pub fn prepare_run(
    experiment: &Experiment,
    batch_exclude: &[String],
) -> Result<PreparedRun, ConfigError> {
    let config = &experiment.config;
    let components = match &config.modify_chem {
        Some(modification) => apply_override(&experiment.composition.components, modification)?,
        None => experiment.composition.components.clone(),
    };

    let exclude: BTreeSet<String> = batch_exclude
        .iter()
        .chain(config.exclude.iter())
        .cloned()
        .collect();

    Ok(PreparedRun {
        name: experiment.name.clone(),
        params: config.params.clone(),
        components,
        modes: config.modes.clone(),
        exclude,
    })
}

fn validate_compositions(compositions: &[Composition]) -> Result<(), ConfigError> {
    if compositions.is_empty() {
        return Err(ConfigError::NoCompositions);
    }
    for (index, composition) in compositions.iter().enumerate() {
        if composition.components.is_empty() {
            return Err(ConfigError::EmptyComposition { index });
        }
        for (component, &value) in &composition.components {
            check_value(component, value)?;
        }
        if composition.total() <= 0.0 {
            return Err(ConfigError::EmptyComposition { index });
        }
    }
    Ok(())
}

fn validate_config(config: &ExperimentConfig) -> Result<(), ConfigError> {
    if let Some(key) = config
        .params
        .keys()
        .find(|key| RESERVED_PARAMS.contains(&key.as_str()))
    {
        return Err(ConfigError::ReservedParam { key: key.clone() });
    }
    if let Some(modification) = &config.modify_chem {
        for (component, &value) in modification {
            check_value(component, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CompositionOverride, ParamValue};

    fn composition(label: &str, sio2: f64) -> Composition {
        Composition {
            label: Some(label.to_string()),
            components: [
                ("SiO2".to_string(), sio2),
                ("MgO".to_string(), 100.0 - sio2),
            ]
            .into(),
        }
    }

    fn default_config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config
            .params
            .insert("Initial Pressure".to_string(), ParamValue::Number(5000.0));
        config.modes = vec!["Fractionate Solids".to_string()];
        config
    }

    #[test]
    fn set_is_grid_times_compositions_with_unique_names() {
        let axes = vec![GridAxis::Param {
            param: "Initial Pressure".to_string(),
            values: vec![ParamValue::Number(1000.0), ParamValue::Number(2000.0)],
        }];
        let compositions = vec![composition("A", 50.0), composition("B", 45.0)];
        let set = build_experiment_set(
            &default_config(),
            &axes,
            &compositions,
            &EnvironmentSpec::new(),
        )
        .expect("plan");

        assert_eq!(set.len(), (1 + 2) * 2);
        let names: BTreeSet<&str> = set.iter().map(|exp| exp.name.as_str()).collect();
        assert_eq!(names.len(), set.len());
        // Compositions vary fastest.
        assert_eq!(set[0].composition.label.as_deref(), Some("A"));
        assert_eq!(set[1].composition.label.as_deref(), Some("B"));
        assert_eq!(set[0].config, set[1].config);
    }

    #[test]
    fn identical_compositions_collide() {
        let compositions = vec![composition("A", 50.0), composition("A", 50.0)];
        let err = build_experiment_set(
            &default_config(),
            &[],
            &compositions,
            &EnvironmentSpec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NameCollision {
                first: 0,
                second: 1,
                ..
            }
        ));
    }

    #[test]
    fn plan_rejects_missing_compositions_and_reserved_params() {
        let err = build_experiment_set(&default_config(), &[], &[], &EnvironmentSpec::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::NoCompositions);

        let mut config = default_config();
        config
            .params
            .insert("Title".to_string(), ParamValue::from("mine"));
        let err = build_experiment_set(
            &config,
            &[],
            &[composition("A", 50.0)],
            &EnvironmentSpec::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ReservedParam {
                key: "Title".to_string()
            }
        );
    }

    #[test]
    fn prepare_applies_override_and_merges_exclusions() {
        let mut config = default_config();
        let mut modification = CompositionOverride::new();
        modification.insert("H2O".to_string(), 4.0);
        config.modify_chem = Some(modification);
        config.exclude = vec!["CO2".to_string()];

        let set = build_experiment_set(
            &config,
            &[],
            &[composition("A", 50.0)],
            &EnvironmentSpec::new(),
        )
        .expect("plan");
        let run = prepare_run(&set[0], &["Suppress".to_string()]).expect("prepare");

        let total: f64 = run.components.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert_eq!(run.components["H2O"], 4.0);
        assert!((run.components["SiO2"] - 48.0).abs() < 1e-9);
        assert_eq!(
            run.exclude.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["CO2", "Suppress"]
        );
        // The experiment itself is left untouched.
        assert!(!set[0].composition.components.contains_key("H2O"));
    }
}
