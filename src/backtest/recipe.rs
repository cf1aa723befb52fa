use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// A named, versioned parameter set driving the predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    pub parameters: RecipeParameters,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeParameters {
    /// Weight of long-run number frequency.
    pub alpha: f64,
    /// Weight of recency (appearances late in the window count more).
    pub beta: f64,
    /// Weight of the gap since a number last appeared.
    pub gamma: f64,
    /// Weight of seeded random noise.
    pub delta: f64,
    /// History window size.
    pub sim_prev_max: u32,
    /// Predictions generated per contest.
    pub sim_preds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_rate: Option<f64>,
}

impl Default for RecipeParameters {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.5,
            gamma: 0.25,
            delta: 0.1,
            sim_prev_max: 50,
            sim_preds: 10,
            seed: None,
            population: None,
            generations: None,
            mutation_rate: None,
        }
    }
}

/// Names a sweep may override.
pub const SWEEPABLE_PARAMETERS: &[&str] = &[
    "alpha",
    "beta",
    "gamma",
    "delta",
    "sim_prev_max",
    "sim_preds",
    "population",
    "generations",
    "mutation_rate",
];

/// Lowercased with `_` and `-` removed, so `sim_preds` and `simPreds` match.
pub(crate) fn canonical_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

// parameters stored as whole numbers
const COUNT_PARAMETERS: &[&str] = &["simprevmax", "simpreds", "population", "generations"];

fn to_count(name: &str, value: f64) -> SimResult<u32> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) || value.fract() != 0.0 {
        return Err(SimError::validation(format!(
            "{name} must be a non-negative integer, got {value}"
        )));
    }
    Ok(value as u32)
}

impl RecipeParameters {
    /// Overrides one parameter by name (snake or camel case).
    pub fn set(&mut self, name: &str, value: f64) -> SimResult<()> {
        match canonical_name(name).as_str() {
            "alpha" => self.alpha = value,
            "beta" => self.beta = value,
            "gamma" => self.gamma = value,
            "delta" => self.delta = value,
            "simprevmax" => self.sim_prev_max = to_count(name, value)?,
            "simpreds" => self.sim_preds = to_count(name, value)?,
            "population" => self.population = Some(to_count(name, value)?),
            "generations" => self.generations = Some(to_count(name, value)?),
            "mutationrate" => self.mutation_rate = Some(value),
            _ => {
                return Err(SimError::validation(format!(
                    "unknown parameter {name:?}; expected one of {}",
                    SWEEPABLE_PARAMETERS.join(", ")
                )))
            }
        }
        Ok(())
    }

    pub fn is_known(name: &str) -> bool {
        let c = canonical_name(name);
        SWEEPABLE_PARAMETERS.iter().any(|p| canonical_name(p) == c)
    }

    /// Whether `name` only takes whole-number values.
    pub fn is_count(name: &str) -> bool {
        COUNT_PARAMETERS.contains(&canonical_name(name).as_str())
    }
}

impl Recipe {
    pub fn new(name: impl Into<String>, parameters: RecipeParameters) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            parameters,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.name.trim().is_empty() {
            return Err(SimError::validation("recipe name must not be empty"));
        }
        let p = &self.parameters;
        for (label, w) in [
            ("alpha", p.alpha),
            ("beta", p.beta),
            ("gamma", p.gamma),
            ("delta", p.delta),
        ] {
            if !w.is_finite() {
                return Err(SimError::validation(format!("{label} must be finite")));
            }
        }
        if p.sim_preds == 0 {
            return Err(SimError::validation("sim_preds must be at least 1"));
        }
        if let Some(rate) = p.mutation_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimError::validation(format!(
                    "mutation_rate must be within [0, 1], got {rate}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_accepts_snake_and_camel_case() {
        let mut p = RecipeParameters::default();
        p.set("simPrevMax", 12.0).unwrap();
        p.set("sim_preds", 3.0).unwrap();
        p.set("mutation_rate", 0.2).unwrap();
        p.set("alpha", 0.75).unwrap();
        assert_eq!(p.sim_prev_max, 12);
        assert_eq!(p.sim_preds, 3);
        assert_eq!(p.mutation_rate, Some(0.2));
        assert_eq!(p.alpha, 0.75);
    }

    #[test]
    fn set_rejects_unknown_and_negative_counts() {
        let mut p = RecipeParameters::default();
        assert!(p.set("epsilon", 1.0).is_err());
        assert!(p.set("sim_preds", -1.0).is_err());
        assert!(p.set("population", 5.2).is_err());
        assert!(RecipeParameters::is_count("simPreds"));
        assert!(!RecipeParameters::is_count("mutation_rate"));
        assert!(RecipeParameters::is_known("SimPrevMax"));
        assert!(!RecipeParameters::is_known("window"));
    }

    #[test]
    fn validate_catches_bad_recipes() {
        let ok = Recipe::new("base", RecipeParameters::default());
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.parameters.sim_preds = 0;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.parameters.beta = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = ok;
        bad.name = "  ".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn deserializes_camel_case_json() {
        let json = r#"{"name":"r1","parameters":{"alpha":1,"beta":0,"gamma":0,"delta":0,"simPrevMax":20,"simPreds":5}}"#;
        let r: Recipe = serde_json::from_str(json).unwrap();
        assert_eq!(r.version, 1);
        assert_eq!(r.parameters.sim_prev_max, 20);
        assert!(r.parameters.seed.is_none());
    }
}
