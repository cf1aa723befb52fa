use crate::backtest::model::{ContestRange, JobStatus, Simulation};
use crate::backtest::store::new_simulation;
use crate::error::{SimError, SimResult};
use crate::ranking::{rank, Metric};
use crate::storage::entity::{sweep_child, sweep_job};
use crate::storage::now_ms;
use crate::storage::repository::{
    NewSweep, NewSweepChild, SimulationRepository, SweepProgress, SweepRepository,
};
use crate::sweep::generator;
use crate::sweep::model::{
    BestConfiguration, ChildCounts, ParamAssignment, SweepConfig, SweepJob, SweepPoint,
    SweepStatusReport,
};
use log::info;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::collections::HashMap;
use std::sync::Arc;

/// A child link joined with its simulation.
struct Child {
    link: sweep_child::Model,
    assignment: Vec<ParamAssignment>,
    simulation: Simulation,
}

pub struct SweepCoordinator {
    db: Arc<DatabaseConnection>,
    max_combinations: usize,
}

impl TryFrom<sweep_job::Model> for SweepJob {
    type Error = SimError;

    fn try_from(m: sweep_job::Model) -> Result<Self, Self::Error> {
        Ok(SweepJob {
            id: m.id,
            name: m.name,
            config: serde_json::from_str(&m.config_json)?,
            range: ContestRange {
                start: m.start_contest,
                end: m.end_contest,
            },
            status: m.status.parse()?,
            total_combinations: m.total_combinations.max(0) as u32,
            completed_count: m.completed_count.max(0) as u32,
            failed_count: m.failed_count.max(0) as u32,
            created_at: m.created_at,
            started_at: m.started_at,
            finished_at: m.finished_at,
            duration_ms: m.duration_ms,
        })
    }
}

impl SweepCoordinator {
    pub fn new(db: Arc<DatabaseConnection>, max_combinations: usize) -> Self {
        Self {
            db,
            max_combinations,
        }
    }

    /// Validates and expands `config`, then creates every child job, the
    /// parent and the links in a single transaction.
    pub async fn create_sweep(&self, config: SweepConfig, range: ContestRange) -> SimResult<SweepJob> {
        generator::validate(&config)?;
        range.validate()?;

        let count = generator::combination_count(&config);
        if count > self.max_combinations {
            return Err(SimError::validation(format!(
                "sweep expands to {count} combinations, limit is {}",
                self.max_combinations
            )));
        }

        let recipes = generator::generate(&config)?;
        let rows = recipes
            .iter()
            .map(|g| -> SimResult<_> {
                Ok((
                    new_simulation(&g.recipe, range)?,
                    g.variation_index as i32,
                    serde_json::to_string(&g.assignment)?,
                ))
            })
            .collect::<SimResult<Vec<_>>>()?;
        let new_sweep = NewSweep {
            name: config.name.clone(),
            config_json: serde_json::to_string(&config)?,
            start_contest: range.start,
            end_contest: range.end,
            total_combinations: recipes.len() as i32,
        };

        // dropping the transaction on an early return rolls everything back
        let txn = self.db.begin().await?;
        let mut links = Vec::with_capacity(rows.len());
        for (new_sim, variation_index, assignment_json) in rows {
            let sim = SimulationRepository::create(&txn, new_sim).await?;
            links.push(NewSweepChild {
                simulation_id: sim.id,
                variation_index,
                assignment_json,
            });
        }
        let parent = SweepRepository::create(&txn, new_sweep).await?;
        SweepRepository::link_children(&txn, parent.id, links).await?;
        txn.commit().await?;

        info!(
            "sweep created sweep_id={} name={} combinations={} range={}..={}",
            parent.id, parent.name, parent.total_combinations, range.start, range.end
        );
        parent.try_into()
    }

    pub async fn get_sweep(&self, id: i32) -> SimResult<SweepJob> {
        SweepRepository::find(self.db.as_ref(), id)
            .await?
            .ok_or(SimError::not_found("sweep", id))?
            .try_into()
    }

    pub async fn list_sweeps(&self) -> SimResult<Vec<SweepJob>> {
        SweepRepository::list(self.db.as_ref())
            .await?
            .into_iter()
            .map(SweepJob::try_from)
            .collect()
    }

    async fn children<C: ConnectionTrait>(db: &C, sweep_id: i32) -> SimResult<Vec<Child>> {
        let links = SweepRepository::children(db, sweep_id).await?;
        let ids: Vec<i32> = links.iter().map(|l| l.simulation_id).collect();
        let mut sims: HashMap<i32, Simulation> = SimulationRepository::find_many(db, &ids)
            .await?
            .into_iter()
            .map(|m| Simulation::try_from(m).map(|s| (s.id, s)))
            .collect::<SimResult<_>>()?;

        links
            .into_iter()
            .map(|link| -> SimResult<Child> {
                let simulation = sims
                    .remove(&link.simulation_id)
                    .ok_or(SimError::not_found("simulation", link.simulation_id))?;
                let assignment = serde_json::from_str(&link.assignment_json)?;
                Ok(Child {
                    link,
                    assignment,
                    simulation,
                })
            })
            .collect()
    }

    fn report(sweep: SweepJob, children: &[Child]) -> SweepStatusReport {
        let counts = ChildCounts::tally(children.iter().map(|c| &c.simulation.status));
        let status = counts.derive_status();
        let done = counts.completed + counts.failed + counts.cancelled;
        let progress = if counts.total == 0 {
            0.0
        } else {
            100.0 * f64::from(done) / f64::from(counts.total)
        };
        SweepStatusReport {
            sweep,
            counts,
            status,
            progress,
        }
    }

    /// Status recomputed from the children. Nothing is written.
    pub async fn get_sweep_status(&self, id: i32) -> SimResult<SweepStatusReport> {
        let sweep = self.get_sweep(id).await?;
        let children = Self::children(self.db.as_ref(), id).await?;
        Ok(Self::report(sweep, &children))
    }

    /// Recomputes the status and writes it, with counts and timing, onto the parent.
    pub async fn update_sweep_progress(&self, id: i32) -> SimResult<SweepStatusReport> {
        let sweep = self.get_sweep(id).await?;
        let children = Self::children(self.db.as_ref(), id).await?;
        let report = Self::report(sweep, &children);

        let started_at = children
            .iter()
            .filter_map(|c| c.simulation.started_at)
            .min();
        let (finished_at, duration_ms) = if report.status.is_terminal() {
            let finished = children
                .iter()
                .filter_map(|c| c.simulation.finished_at)
                .max()
                .unwrap_or_else(now_ms);
            let begin = started_at.unwrap_or(report.sweep.created_at);
            (Some(finished), Some((finished - begin).max(0)))
        } else {
            (None, None)
        };

        let saved = SweepRepository::save_progress(
            self.db.as_ref(),
            id,
            SweepProgress {
                status: report.status.as_str().to_string(),
                completed_count: report.counts.completed as i32,
                failed_count: report.counts.failed as i32,
                started_at,
                finished_at,
                duration_ms,
            },
        )
        .await?;

        info!(
            "sweep progress sweep_id={} status={} completed={}/{} failed={}",
            id, report.status, report.counts.completed, report.counts.total, report.counts.failed
        );
        Ok(SweepStatusReport {
            sweep: saved.try_into()?,
            ..report
        })
    }

    /// Highest-scoring completed child. The sweep must be completed.
    pub async fn find_best(&self, id: i32, metric: Metric) -> SimResult<BestConfiguration> {
        let sweep = self.get_sweep(id).await?;
        let children = Self::children(self.db.as_ref(), id).await?;
        let report = Self::report(sweep, &children);
        if report.status != JobStatus::Completed {
            return Err(SimError::InvalidState(format!(
                "sweep {id} is {}, best configuration needs a completed sweep",
                report.status
            )));
        }

        let scored: Vec<(&Child, f64)> = children
            .iter()
            .filter(|c| c.simulation.status == JobStatus::Completed)
            .filter_map(|c| {
                c.simulation
                    .summary
                    .as_ref()
                    .map(|s| (c, metric.extract(s)))
            })
            .collect();
        let values: Vec<(i32, f64)> = scored
            .iter()
            .map(|(c, v)| (c.simulation.id, *v))
            .collect();

        let top = rank(&values)
            .into_iter()
            .next()
            .ok_or_else(|| SimError::InvalidState(format!("sweep {id} has no scored children")))?;
        let (best, value) = scored
            .iter()
            .find(|(c, _)| c.simulation.id == top.simulation_id)
            .ok_or(SimError::not_found("simulation", top.simulation_id))?;

        let n = values.len();
        let rank = 1 + values.iter().filter(|(_, v)| *v > *value).count();
        let percentile = 100.0 * (n - rank + 1) as f64 / n as f64;

        Ok(BestConfiguration {
            sweep_id: id,
            simulation_id: best.simulation.id,
            variation_index: best.link.variation_index.max(0) as usize,
            assignment: best.assignment.clone(),
            metric,
            value: *value,
            rank,
            percentile,
            summary: best.simulation.summary.clone().unwrap_or_default(),
        })
    }

    /// Every child's assignment and metric value, in variation order.
    pub async fn sweep_results(&self, id: i32, metric: Metric) -> SimResult<Vec<SweepPoint>> {
        self.get_sweep(id).await?;
        let children = Self::children(self.db.as_ref(), id).await?;
        Ok(children
            .into_iter()
            .map(|c| SweepPoint {
                simulation_id: c.simulation.id,
                variation_index: c.link.variation_index.max(0) as usize,
                value: match c.simulation.status {
                    JobStatus::Completed => c.simulation.summary.as_ref().map(|s| metric.extract(s)),
                    _ => None,
                },
                status: c.simulation.status,
                assignment: c.assignment,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::model::{BacktestOutcome, SimulationSummary};
    use crate::backtest::recipe::{Recipe, RecipeParameters};
    use crate::backtest::store::{JobStore, SqlStore};
    use crate::storage::establish_in_memory;
    use crate::sweep::model::{ParameterSweep, SweepValues};

    fn config(values: Vec<f64>) -> SweepConfig {
        SweepConfig {
            name: "alpha-grid".into(),
            base_recipe: Recipe::new("base", RecipeParameters::default()),
            parameters: vec![ParameterSweep {
                name: "alpha".into(),
                values: SweepValues::List { values },
            }],
        }
    }

    async fn setup(cap: usize) -> (SweepCoordinator, SqlStore) {
        let db = Arc::new(establish_in_memory().await.unwrap());
        (SweepCoordinator::new(db.clone(), cap), SqlStore::new(db))
    }

    async fn finish(store: &SqlStore, id: i32, quina: u32) {
        store.claim(id, "w1").await.unwrap().unwrap();
        let outcome = BacktestOutcome {
            summary: SimulationSummary::finalize(10, quina, 0, 0),
            contests: Vec::new(),
        };
        assert!(store.complete(id, "w1", &outcome, 5).await.unwrap());
    }

    #[tokio::test]
    async fn creates_children_and_links_atomically() {
        let (coord, _store) = setup(100).await;
        let sweep = coord
            .create_sweep(config(vec![0.1, 0.2, 0.3]), ContestRange::new(1, 20).unwrap())
            .await
            .unwrap();
        assert_eq!(sweep.total_combinations, 3);
        assert_eq!(sweep.status, JobStatus::Pending);

        let report = coord.get_sweep_status(sweep.id).await.unwrap();
        assert_eq!(report.counts.total, 3);
        assert_eq!(report.counts.pending, 3);
        assert_eq!(report.status, JobStatus::Pending);

        let points = coord.sweep_results(sweep.id, Metric::AverageHits).await.unwrap();
        let alphas: Vec<f64> = points.iter().map(|p| p.assignment[0].value).collect();
        assert_eq!(alphas, vec![0.1, 0.2, 0.3]);
        assert!(points.iter().all(|p| p.value.is_none()));
    }

    #[tokio::test]
    async fn oversized_sweep_creates_nothing() {
        let (coord, store) = setup(2).await;
        let err = coord
            .create_sweep(config(vec![1.0, 2.0, 3.0]), ContestRange::new(1, 5).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Validation(_)));
        assert!(coord.list_sweeps().await.unwrap().is_empty());
        let stats = SimulationRepository::get_stats(store.db().as_ref()).await.unwrap();
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let (coord, _store) = setup(100).await;
        let err = coord
            .create_sweep(config(vec![]), ContestRange::new(1, 5).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Validation(_)));
    }

    #[tokio::test]
    async fn progress_and_best_follow_children() {
        let (coord, store) = setup(100).await;
        let sweep = coord
            .create_sweep(config(vec![0.1, 0.2, 0.3]), ContestRange::new(1, 20).unwrap())
            .await
            .unwrap();
        let ids: Vec<i32> = coord
            .sweep_results(sweep.id, Metric::QuinaHits)
            .await
            .unwrap()
            .iter()
            .map(|p| p.simulation_id)
            .collect();

        finish(&store, ids[0], 1).await;
        let mid = coord.update_sweep_progress(sweep.id).await.unwrap();
        assert_eq!(mid.status, JobStatus::Running);
        assert_eq!(mid.sweep.status, JobStatus::Running);
        assert_eq!(mid.sweep.completed_count, 1);
        assert!(mid.sweep.finished_at.is_none());
        assert!(coord.find_best(sweep.id, Metric::QuinaHits).await.is_err());

        finish(&store, ids[1], 3).await;
        finish(&store, ids[2], 2).await;
        let done = coord.update_sweep_progress(sweep.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.sweep.finished_at.is_some());
        assert!(done.sweep.duration_ms.is_some());
        assert_eq!(done.progress, 100.0);

        let best = coord.find_best(sweep.id, Metric::QuinaHits).await.unwrap();
        assert_eq!(best.simulation_id, ids[1]);
        assert_eq!(best.variation_index, 1);
        assert_eq!(best.value, 3.0);
        assert_eq!(best.rank, 1);
        assert_eq!(best.percentile, 100.0);
        assert_eq!(best.assignment[0].value, 0.2);
    }

    #[tokio::test]
    async fn failed_child_fails_the_sweep_once_others_finish() {
        let (coord, store) = setup(100).await;
        let sweep = coord
            .create_sweep(config(vec![0.5, 0.6]), ContestRange::new(1, 20).unwrap())
            .await
            .unwrap();
        let ids: Vec<i32> = coord
            .sweep_results(sweep.id, Metric::QuinaHits)
            .await
            .unwrap()
            .iter()
            .map(|p| p.simulation_id)
            .collect();

        store.claim(ids[0], "w1").await.unwrap().unwrap();
        store
            .fail(ids[0], "w1", &SimError::validation("boom"), 1)
            .await
            .unwrap();
        // a failure is not final while a sibling is still pending
        assert_eq!(
            coord.get_sweep_status(sweep.id).await.unwrap().status,
            JobStatus::Running
        );
        finish(&store, ids[1], 0).await;
        let report = coord.update_sweep_progress(sweep.id).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.sweep.failed_count, 1);
    }

    #[tokio::test]
    async fn unknown_sweep_is_not_found() {
        let (coord, _store) = setup(10).await;
        let err = coord.get_sweep_status(99).await.unwrap_err();
        assert!(matches!(err, SimError::NotFound { entity: "sweep", id: 99 }));
    }
}
