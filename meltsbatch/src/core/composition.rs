//! Composition renormalization.

use std::collections::BTreeMap;

use super::error::ConfigError;
use super::types::CompositionOverride;

/// Target total for every rendered composition, in wt%.
pub const TOTAL_WT_PCT: f64 = 100.0;

const TOLERANCE: f64 = 1e-9;

/// Fix the components named in `modification` and rescale every other
/// component so the composition still sums to 100.
///
/// Unmodified components keep their relative proportions. Components named
/// only in the override are added.
pub fn apply_override(
    components: &BTreeMap<String, f64>,
    modification: &CompositionOverride,
) -> Result<BTreeMap<String, f64>, ConfigError> {
    for (component, &value) in modification {
        check_value(component, value)?;
    }
    let fixed: f64 = modification.values().sum();
    if fixed > TOTAL_WT_PCT + TOLERANCE {
        return Err(ConfigError::OverrideExceedsTotal { fixed });
    }

    let unmodified_total: f64 = components
        .iter()
        .filter(|(component, _)| !modification.contains_key(*component))
        .map(|(_, value)| value)
        .sum();
    let remainder = TOTAL_WT_PCT - fixed;

    let mut result = BTreeMap::new();
    if unmodified_total <= TOLERANCE {
        if remainder.abs() > TOLERANCE {
            return Err(ConfigError::NothingToRenormalize { fixed });
        }
    } else {
        let scale = remainder / unmodified_total;
        for (component, value) in components {
            if !modification.contains_key(component) {
                result.insert(component.clone(), value * scale);
            }
        }
    }
    for (component, value) in modification {
        result.insert(component.clone(), *value);
    }
    Ok(result)
}

/// Scale `components` so they sum to 100.
pub fn normalize(components: &BTreeMap<String, f64>) -> Option<BTreeMap<String, f64>> {
    let total: f64 = components.values().sum();
    if total <= TOLERANCE {
        return None;
    }
    let scale = TOTAL_WT_PCT / total;
    Some(
        components
            .iter()
            .map(|(component, value)| (component.clone(), value * scale))
            .collect(),
    )
}

/// Components must be finite and non-negative.
pub fn check_value(component: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidComponent {
            component: component.to_string(),
            value,
        });
    }
    Ok(())
}
