use crate::backtest::recipe::Recipe;
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive contest range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestRange {
    pub start: i32,
    pub end: i32,
}

impl ContestRange {
    pub fn new(start: i32, end: i32) -> SimResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.end < self.start {
            return Err(SimError::validation(format!(
                "empty contest range: end {} < start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }

    pub fn contests(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SimError::validation(format!("unknown status {s:?}")))
    }
}

/// Aggregate hit counts of one backtest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub total_contests: u32,
    pub quina_hits: u32,
    pub quadra_hits: u32,
    pub terno_hits: u32,
    pub average_hits: f64,
    pub quina_rate: f64,
    pub quadra_rate: f64,
    pub terno_rate: f64,
}

impl SimulationSummary {
    /// Fills the derived averages from the raw counters.
    pub fn finalize(total_contests: u32, quina_hits: u32, quadra_hits: u32, terno_hits: u32) -> Self {
        let (average_hits, quina_rate, quadra_rate, terno_rate) = if total_contests == 0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let n = f64::from(total_contests);
            let weighted = 5.0 * f64::from(quina_hits)
                + 4.0 * f64::from(quadra_hits)
                + 3.0 * f64::from(terno_hits);
            (
                weighted / n,
                f64::from(quina_hits) / n,
                f64::from(quadra_hits) / n,
                f64::from(terno_hits) / n,
            )
        };
        Self {
            total_contests,
            quina_hits,
            quadra_hits,
            terno_hits,
            average_hits,
            quina_rate,
            quadra_rate,
            terno_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub numbers: Vec<u8>,
}

impl Prediction {
    pub fn new(mut numbers: Vec<u8>) -> Self {
        numbers.sort_unstable();
        Self { numbers }
    }
}

/// Per-contest record produced during execution (a ContestResult row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestOutcome {
    pub contest: i32,
    pub actual: Vec<u8>,
    pub best_hits: u8,
    pub best_prediction: Option<Prediction>,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestOutcome {
    pub summary: SimulationSummary,
    pub contests: Vec<ContestOutcome>,
}

/// A persisted backtest job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub id: i32,
    pub recipe: Recipe,
    pub range: ContestRange,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub summary: Option<SimulationSummary>,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
}

impl Simulation {
    /// Per-job value the contest seeds derive from.
    pub fn job_seed(&self) -> u64 {
        self.recipe.parameters.seed.unwrap_or(self.id as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Zero-based page number.
    pub page: u64,
    pub per_page: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: 50,
        }
    }
}
