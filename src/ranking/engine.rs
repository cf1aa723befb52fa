use crate::backtest::model::{JobStatus, Simulation};
use crate::ranking::metric::Metric;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub simulation_id: i32,
    pub value: f64,
    /// 1-based.
    pub rank: usize,
    pub percentile: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricComparison {
    pub metric: Metric,
    pub rankings: Vec<RankedEntry>,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Completed simulations that took part, ascending id.
    pub simulation_ids: Vec<i32>,
    pub metrics: Vec<MetricComparison>,
}

/// Orders `(id, value)` pairs best first. Equal values keep ascending id order.
pub fn rank(values: &[(i32, f64)]) -> Vec<RankedEntry> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (simulation_id, value))| RankedEntry {
            simulation_id,
            value,
            rank: i + 1,
            percentile: 100.0 * (n - i as f64) / n,
        })
        .collect()
}

pub fn stats(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }

    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = count / 2;
    let median = if count % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    Stats {
        count,
        mean,
        std_dev: variance.sqrt(),
        median,
        min: sorted[0],
        max: sorted[count - 1],
    }
}

/// `(id, value)` for every completed simulation that has a summary.
pub fn metric_values(simulations: &[Simulation], metric: Metric) -> Vec<(i32, f64)> {
    simulations
        .iter()
        .filter(|s| s.status == JobStatus::Completed)
        .filter_map(|s| s.summary.as_ref().map(|sum| (s.id, metric.extract(sum))))
        .collect()
}

/// Per-metric rankings and statistics over the completed subset of `simulations`.
pub fn compare(simulations: &[Simulation], metrics: &[Metric]) -> Comparison {
    let mut simulation_ids: Vec<i32> = simulations
        .iter()
        .filter(|s| s.status == JobStatus::Completed && s.summary.is_some())
        .map(|s| s.id)
        .collect();
    simulation_ids.sort_unstable();
    simulation_ids.dedup();

    let metrics = metrics
        .iter()
        .map(|&metric| {
            let values = metric_values(simulations, metric);
            let raw: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
            MetricComparison {
                metric,
                rankings: rank(&values),
                stats: stats(&raw),
            }
        })
        .collect();

    Comparison {
        simulation_ids,
        metrics,
    }
}
