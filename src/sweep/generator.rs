use crate::backtest::recipe::{canonical_name, RecipeParameters};
use crate::error::{SimError, SimResult};
use crate::sweep::model::{GeneratedRecipe, ParamAssignment, SweepConfig, SweepValues};
use std::collections::HashSet;

/// Tolerance for the last step of a range landing on `max`.
const RANGE_EPSILON: f64 = 1e-9;

pub fn validate(config: &SweepConfig) -> SimResult<()> {
    if config.name.trim().is_empty() {
        return Err(SimError::validation("sweep name must not be empty"));
    }
    if config.parameters.is_empty() {
        return Err(SimError::validation("sweep must name at least one parameter"));
    }
    config.base_recipe.validate()?;

    let mut seen = HashSet::new();
    for p in &config.parameters {
        if !RecipeParameters::is_known(&p.name) {
            return Err(SimError::validation(format!(
                "unknown sweep parameter {:?}",
                p.name
            )));
        }
        if !seen.insert(canonical_name(&p.name)) {
            return Err(SimError::validation(format!(
                "parameter {:?} is swept more than once",
                p.name
            )));
        }

        match &p.values {
            SweepValues::Range { min, max, step } => {
                if !(min.is_finite() && max.is_finite() && step.is_finite()) {
                    return Err(SimError::validation(format!(
                        "{}: range bounds must be finite",
                        p.name
                    )));
                }
                if *step <= 0.0 {
                    return Err(SimError::validation(format!(
                        "{}: step must be greater than 0",
                        p.name
                    )));
                }
                if min > max {
                    return Err(SimError::validation(format!(
                        "{}: min {} is greater than max {}",
                        p.name, min, max
                    )));
                }
                // whole-number min and step keep every point whole
                if RecipeParameters::is_count(&p.name) && (min.fract() != 0.0 || step.fract() != 0.0) {
                    return Err(SimError::validation(format!(
                        "{}: min and step must be whole numbers",
                        p.name
                    )));
                }
            }
            SweepValues::List { values } => {
                if values.is_empty() {
                    return Err(SimError::validation(format!(
                        "{}: value list is empty",
                        p.name
                    )));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(SimError::validation(format!(
                        "{}: list values must be finite",
                        p.name
                    )));
                }
                if RecipeParameters::is_count(&p.name) && values.iter().any(|v| v.fract() != 0.0) {
                    return Err(SimError::validation(format!(
                        "{}: list values must be whole numbers",
                        p.name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn range_len(min: f64, max: f64, step: f64) -> usize {
    ((max - min) / step + RANGE_EPSILON).floor() as usize + 1
}

/// Values of one parameter in ascending order.
pub fn enumerate(values: &SweepValues) -> Vec<f64> {
    match values {
        SweepValues::Range { min, max, step } => (0..range_len(*min, *max, *step))
            .map(|i| min + i as f64 * step)
            .collect(),
        SweepValues::List { values } => {
            let mut v = values.clone();
            v.sort_by(f64::total_cmp);
            v.dedup();
            v
        }
    }
}

fn value_count(values: &SweepValues) -> usize {
    match values {
        SweepValues::Range { min, max, step } => range_len(*min, *max, *step),
        SweepValues::List { .. } => enumerate(values).len(),
    }
}

/// Size of the Cartesian product, saturating at `usize::MAX`. Does not
/// enumerate, so it is safe to call before capping a request.
pub fn combination_count(config: &SweepConfig) -> usize {
    config
        .parameters
        .iter()
        .map(|p| value_count(&p.values))
        .fold(1usize, usize::saturating_mul)
}

/// Expands the grid. Parameters vary in declaration order with the last one
/// changing fastest; indices are 0-based in that order.
pub fn generate(config: &SweepConfig) -> SimResult<Vec<GeneratedRecipe>> {
    validate(config)?;

    let axes: Vec<(&str, Vec<f64>)> = config
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), enumerate(&p.values)))
        .collect();
    let total = combination_count(config);

    let mut out = Vec::with_capacity(total);
    let mut cursor = vec![0usize; axes.len()];
    for variation_index in 0..total {
        let mut recipe = config.base_recipe.clone();
        let mut assignment = Vec::with_capacity(axes.len());
        for ((name, values), &i) in axes.iter().zip(&cursor) {
            let value = values[i];
            recipe.parameters.set(name, value)?;
            assignment.push(ParamAssignment {
                name: name.to_string(),
                value,
            });
        }
        recipe.validate()?;
        out.push(GeneratedRecipe {
            variation_index,
            assignment,
            recipe,
        });

        // odometer step
        for axis in (0..axes.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < axes[axis].1.len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
    Ok(out)
}
