use crate::backtest::draw::Draw;
use crate::backtest::engine::BacktestEngine;
use crate::backtest::executor::JobExecutor;
use crate::backtest::model::{ContestOutcome, ContestRange, JobStatus, Page, Simulation};
use crate::backtest::recipe::Recipe;
use crate::backtest::store::{JobStore, SqlStore};
use crate::error::{SimError, SimResult};
use crate::ranking::{compare, leaderboard, Comparison, LeaderboardEntry, LeaderboardFilter, Metric};
use crate::storage::repository::{DrawRepository, JobStats, SimulationRepository, SweepRepository};
use crate::sweep::model::{BestConfiguration, SweepConfig, SweepJob, SweepPoint, SweepStatusReport};
use crate::sweep::SweepCoordinator;
use log::info;
use sea_orm::DatabaseConnection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Caller-facing operations over simulations, sweeps and rankings.
pub struct SimulationService {
    db: Arc<DatabaseConnection>,
    store: Arc<SqlStore>,
    executor: Arc<JobExecutor>,
    sweeps: SweepCoordinator,
    sync_runs: AtomicU64,
}

impl SimulationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        engine: BacktestEngine,
        max_sweep_combinations: usize,
    ) -> Self {
        let store = Arc::new(SqlStore::new(db.clone()));
        let executor = Arc::new(JobExecutor::new(store.clone(), store.clone(), engine));
        Self {
            sweeps: SweepCoordinator::new(db.clone(), max_sweep_combinations),
            db,
            store,
            executor,
            sync_runs: AtomicU64::new(0),
        }
    }

    pub fn job_store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    pub fn executor(&self) -> Arc<JobExecutor> {
        self.executor.clone()
    }

    /// Creates a job. With `run_async` it is left for the worker pool;
    /// otherwise it is inserted already claimed, runs here, and execution
    /// errors surface to the caller.
    pub async fn create_simulation(
        &self,
        recipe: Recipe,
        range: ContestRange,
        run_async: bool,
    ) -> SimResult<Simulation> {
        recipe.validate()?;
        range.validate()?;
        if run_async {
            let job = self.store.create(&recipe, range).await?;
            info!(
                "simulation queued id={} recipe={} range={}..={}",
                job.id, job.recipe.name, range.start, range.end
            );
            return Ok(job);
        }

        let seq = self.sync_runs.fetch_add(1, Ordering::Relaxed) + 1;
        let worker_id = format!("sync-{}-{}", std::process::id(), seq);
        let job = self.store.create_claimed(&recipe, range, &worker_id).await?;
        info!(
            "simulation created id={} recipe={} range={}..={} worker={}",
            job.id, job.recipe.name, range.start, range.end, worker_id
        );
        self.run_claimed(job, &worker_id).await
    }

    /// Claims a pending job by id and runs it on the calling task.
    pub async fn execute_simulation(&self, id: i32) -> SimResult<Simulation> {
        let worker_id = format!("sync-{id}");
        let Some(job) = self.store.claim(id, &worker_id).await? else {
            let job = self.store.get(id).await?;
            return Err(SimError::InvalidState(format!(
                "simulation {id} is {}, only pending simulations can be executed",
                job.status
            )));
        };
        self.run_claimed(job, &worker_id).await
    }

    async fn run_claimed(&self, job: Simulation, worker_id: &str) -> SimResult<Simulation> {
        let id = job.id;
        self.executor
            .execute(job, worker_id, &CancellationToken::new())
            .await?;
        self.store.get(id).await
    }

    /// Marks the job cancelled and aborts its run if one is in flight here.
    pub async fn cancel_simulation(&self, id: i32) -> SimResult<Simulation> {
        let job = self.store.cancel(id).await?;
        if self.executor.cancel_running(id).await {
            info!("aborted in-flight run of simulation id={}", id);
        }
        Ok(job)
    }

    pub async fn get_simulation(&self, id: i32) -> SimResult<Simulation> {
        self.store.get(id).await
    }

    pub async fn list_simulations(&self, status: JobStatus, page: Page) -> SimResult<Vec<Simulation>> {
        self.store.list_by_status(status, page).await
    }

    pub async fn contest_results(&self, id: i32) -> SimResult<Vec<ContestOutcome>> {
        self.store.get(id).await?;
        SimulationRepository::contest_results(self.db.as_ref(), id)
            .await?
            .into_iter()
            .map(ContestOutcome::try_from)
            .collect()
    }

    /// Removes a job and its contest rows. Running jobs and sweep members are kept.
    pub async fn delete_simulation(&self, id: i32) -> SimResult<()> {
        let job = self.store.get(id).await?;
        if job.status == JobStatus::Running {
            return Err(SimError::InvalidState(format!(
                "simulation {id} is running"
            )));
        }
        if let Some(sweep_id) = SweepRepository::sweep_of(self.db.as_ref(), id).await? {
            return Err(SimError::InvalidState(format!(
                "simulation {id} belongs to sweep {sweep_id}"
            )));
        }
        if SimulationRepository::delete(self.db.as_ref(), id).await? == 0 {
            return Err(SimError::InvalidState(format!(
                "simulation {id} could not be deleted"
            )));
        }
        info!("simulation deleted id={}", id);
        Ok(())
    }

    pub async fn stats(&self) -> SimResult<JobStats> {
        Ok(SimulationRepository::get_stats(self.db.as_ref()).await?)
    }

    pub async fn create_sweep(&self, config: SweepConfig, range: ContestRange) -> SimResult<SweepJob> {
        self.sweeps.create_sweep(config, range).await
    }

    pub async fn list_sweeps(&self) -> SimResult<Vec<SweepJob>> {
        self.sweeps.list_sweeps().await
    }

    pub async fn get_sweep_status(&self, id: i32) -> SimResult<SweepStatusReport> {
        self.sweeps.get_sweep_status(id).await
    }

    pub async fn update_sweep_progress(&self, id: i32) -> SimResult<SweepStatusReport> {
        self.sweeps.update_sweep_progress(id).await
    }

    pub async fn find_best(&self, id: i32, metric: Metric) -> SimResult<BestConfiguration> {
        self.sweeps.find_best(id, metric).await
    }

    pub async fn sweep_results(&self, id: i32, metric: Metric) -> SimResult<Vec<SweepPoint>> {
        self.sweeps.sweep_results(id, metric).await
    }

    /// Rankings and statistics per metric over the completed jobs among `ids`.
    pub async fn compare(&self, ids: &[i32], metrics: &[Metric]) -> SimResult<Comparison> {
        if ids.is_empty() {
            return Err(SimError::validation("nothing to compare"));
        }
        if metrics.is_empty() {
            return Err(SimError::validation("at least one metric is required"));
        }
        let sims = SimulationRepository::find_many(self.db.as_ref(), ids)
            .await?
            .into_iter()
            .map(Simulation::try_from)
            .collect::<SimResult<Vec<_>>>()?;
        if let Some(missing) = ids.iter().find(|id| !sims.iter().any(|s| s.id == **id)) {
            return Err(SimError::not_found("simulation", *missing));
        }
        Ok(compare(&sims, metrics))
    }

    pub async fn get_leaderboard(
        &self,
        metric: Metric,
        filter: &LeaderboardFilter,
    ) -> SimResult<Vec<LeaderboardEntry>> {
        let sims = SimulationRepository::find_completed(
            self.db.as_ref(),
            filter.recipe_name.as_deref(),
        )
        .await?
        .into_iter()
        .map(Simulation::try_from)
        .collect::<SimResult<Vec<_>>>()?;
        Ok(leaderboard(&sims, metric, filter))
    }

    pub async fn import_draws(&self, draws: &[Draw]) -> SimResult<u64> {
        let n = DrawRepository::upsert_many(self.db.as_ref(), draws).await?;
        info!("imported draws count={}", n);
        Ok(n)
    }

    pub async fn draw_count(&self) -> SimResult<u64> {
        Ok(DrawRepository::count(self.db.as_ref()).await?)
    }
}
