use crate::backtest::model::SimulationSummary;
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every rankable value of a simulation summary. Higher is better for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AverageHits,
    QuinaRate,
    QuadraRate,
    TernoRate,
    QuinaHits,
    QuadraHits,
    TernoHits,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::AverageHits,
        Metric::QuinaRate,
        Metric::QuadraRate,
        Metric::TernoRate,
        Metric::QuinaHits,
        Metric::QuadraHits,
        Metric::TernoHits,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::AverageHits => "average_hits",
            Metric::QuinaRate => "quina_rate",
            Metric::QuadraRate => "quadra_rate",
            Metric::TernoRate => "terno_rate",
            Metric::QuinaHits => "quina_hits",
            Metric::QuadraHits => "quadra_hits",
            Metric::TernoHits => "terno_hits",
        }
    }

    pub fn extract(&self, s: &SimulationSummary) -> f64 {
        match self {
            Metric::AverageHits => s.average_hits,
            Metric::QuinaRate => s.quina_rate,
            Metric::QuadraRate => s.quadra_rate,
            Metric::TernoRate => s.terno_rate,
            Metric::QuinaHits => f64::from(s.quina_hits),
            Metric::QuadraHits => f64::from(s.quadra_hits),
            Metric::TernoHits => f64::from(s.terno_hits),
        }
    }

    /// Parses a comma separated list, e.g. `average_hits,quinaRate`.
    pub fn parse_list(s: &str) -> SimResult<Vec<Metric>> {
        let metrics = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Metric::from_str)
            .collect::<SimResult<Vec<_>>>()?;
        if metrics.is_empty() {
            return Err(SimError::validation("at least one metric is required"));
        }
        Ok(metrics)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Metric::ALL
            .into_iter()
            .find(|m| m.name().replace('_', "") == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(Metric::name).collect();
                SimError::validation(format!(
                    "unknown metric {s:?}; expected one of {}",
                    known.join(", ")
                ))
            })
    }
}
