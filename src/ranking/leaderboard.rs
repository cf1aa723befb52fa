use crate::backtest::model::{JobStatus, Simulation};
use crate::ranking::engine::rank;
use crate::ranking::metric::Metric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardFilter {
    pub recipe_name: Option<String>,
    /// Skip simulations that scored fewer contests than this.
    pub min_contests: Option<u32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub simulation_id: i32,
    pub recipe_name: String,
    pub value: f64,
    pub percentile: f64,
    pub total_contests: u32,
}

/// Ranks completed simulations by `metric`. Percentiles are taken over the
/// whole filtered field, before `limit` truncates it.
pub fn leaderboard(
    simulations: &[Simulation],
    metric: Metric,
    filter: &LeaderboardFilter,
) -> Vec<LeaderboardEntry> {
    let eligible: HashMap<i32, &Simulation> = simulations
        .iter()
        .filter(|s| s.status == JobStatus::Completed)
        .filter(|s| {
            filter
                .recipe_name
                .as_deref()
                .map_or(true, |name| s.recipe.name == name)
        })
        .filter(|s| {
            let contests = s.summary.as_ref().map_or(0, |sum| sum.total_contests);
            filter.min_contests.map_or(true, |min| contests >= min)
        })
        .filter(|s| s.summary.is_some())
        .map(|s| (s.id, s))
        .collect();

    let values: Vec<(i32, f64)> = eligible
        .values()
        .filter_map(|s| s.summary.as_ref().map(|sum| (s.id, metric.extract(sum))))
        .collect();

    let limit = filter.limit.unwrap_or(usize::MAX);
    rank(&values)
        .into_iter()
        .take(limit)
        .filter_map(|r| {
            let sim = eligible.get(&r.simulation_id)?;
            Some(LeaderboardEntry {
                rank: r.rank,
                simulation_id: r.simulation_id,
                recipe_name: sim.recipe.name.clone(),
                value: r.value,
                percentile: r.percentile,
                total_contests: sim.summary.as_ref().map_or(0, |s| s.total_contests),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::model::{ContestRange, SimulationSummary};
    use crate::backtest::recipe::{Recipe, RecipeParameters};

    fn completed(id: i32, name: &str, total: u32, quina: u32) -> Simulation {
        Simulation {
            id,
            recipe: Recipe::new(name, RecipeParameters::default()),
            range: ContestRange { start: 1, end: 100 },
            status: JobStatus::Completed,
            worker_id: Some("w1".into()),
            created_at: 0,
            started_at: Some(0),
            finished_at: Some(1),
            duration_ms: Some(1),
            summary: Some(SimulationSummary::finalize(total, quina, 0, 0)),
            error_message: None,
            error_detail: None,
        }
    }

    #[test]
    fn orders_and_limits() {
        let sims = vec![
            completed(1, "a", 10, 1),
            completed(2, "b", 10, 3),
            completed(3, "a", 10, 2),
        ];
        let filter = LeaderboardFilter {
            limit: Some(2),
            ..Default::default()
        };
        let board = leaderboard(&sims, Metric::QuinaHits, &filter);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].simulation_id, 2);
        assert_eq!(board[1].simulation_id, 3);
        assert_eq!(board[1].rank, 2);
        assert!((board[1].percentile - 100.0 * 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn filters_by_recipe_and_contest_count() {
        let sims = vec![
            completed(1, "a", 10, 1),
            completed(2, "b", 50, 3),
            completed(3, "a", 50, 2),
        ];
        let filter = LeaderboardFilter {
            recipe_name: Some("a".into()),
            min_contests: Some(20),
            limit: None,
        };
        let board = leaderboard(&sims, Metric::QuinaHits, &filter);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].simulation_id, 3);
        assert_eq!(board[0].percentile, 100.0);
    }
}
