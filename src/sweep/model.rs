use crate::backtest::model::{ContestRange, JobStatus, SimulationSummary};
use crate::backtest::recipe::Recipe;
use crate::ranking::Metric;
use serde::{Deserialize, Serialize};

/// A grid search request: every combination of `parameters` applied to `base_recipe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    pub name: String,
    pub base_recipe: Recipe,
    pub parameters: Vec<ParameterSweep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSweep {
    pub name: String,
    #[serde(flatten)]
    pub values: SweepValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SweepValues {
    Range { min: f64, max: f64, step: f64 },
    List { values: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAssignment {
    pub name: String,
    pub value: f64,
}

/// One point of the grid. Maps to exactly one child simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRecipe {
    pub variation_index: usize,
    pub assignment: Vec<ParamAssignment>,
    pub recipe: Recipe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepJob {
    pub id: i32,
    pub name: String,
    pub config: SweepConfig,
    pub range: ContestRange,
    /// Last persisted status. Only `update_sweep_progress` writes it.
    pub status: JobStatus,
    pub total_combinations: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// Child status counts of a sweep, computed from its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildCounts {
    pub total: u32,
    pub pending: u32,
    pub running: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
}

impl ChildCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a JobStatus>) -> Self {
        let mut c = Self::default();
        for s in statuses {
            c.total += 1;
            match s {
                JobStatus::Pending => c.pending += 1,
                JobStatus::Running => c.running += 1,
                JobStatus::Completed => c.completed += 1,
                JobStatus::Failed => c.failed += 1,
                JobStatus::Cancelled => c.cancelled += 1,
            }
        }
        c
    }

    /// Overall sweep status implied by the counts.
    pub fn derive_status(&self) -> JobStatus {
        let active = self.pending + self.running;
        if active == 0 && self.failed > 0 {
            JobStatus::Failed
        } else if self.total > 0 && self.completed == self.total {
            JobStatus::Completed
        } else if active == 0 && self.cancelled > 0 {
            // all children settled, some cancelled and none failed
            JobStatus::Cancelled
        } else if self.total > self.pending {
            JobStatus::Running
        } else {
            JobStatus::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStatusReport {
    pub sweep: SweepJob,
    pub counts: ChildCounts,
    pub status: JobStatus,
    /// Percentage of children in a terminal state.
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestConfiguration {
    pub sweep_id: i32,
    pub simulation_id: i32,
    pub variation_index: usize,
    pub assignment: Vec<ParamAssignment>,
    pub metric: Metric,
    pub value: f64,
    pub rank: usize,
    pub percentile: f64,
    pub summary: SimulationSummary,
}

/// One child's coordinates and score, for plotting a sweep surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepPoint {
    pub simulation_id: i32,
    pub variation_index: usize,
    pub assignment: Vec<ParamAssignment>,
    pub status: JobStatus,
    pub value: Option<f64>,
}
