use crate::backtest::engine::BacktestEngine;
use crate::backtest::model::{BacktestOutcome, Simulation, SimulationSummary};
use crate::backtest::store::{DrawSource, JobStore};
use crate::error::{SimError, SimResult};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Runs one claimed job to its end state. Shared by the worker pool and
/// synchronous execution.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    draws: Arc<dyn DrawSource>,
    engine: BacktestEngine,
    in_flight: Mutex<HashMap<i32, CancellationToken>>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        draws: Arc<dyn DrawSource>,
        engine: BacktestEngine,
    ) -> Self {
        Self {
            store,
            draws,
            engine,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Executes a job already claimed by `worker_id`.
    ///
    /// * success: results and summary committed together, job `completed`
    /// * execution error: job `failed` with message and detail
    /// * cancellation: nothing written, job left as it is
    /// * commit error: nothing written, job stays `running`
    pub async fn execute(
        &self,
        job: Simulation,
        worker_id: &str,
        cancel: &CancellationToken,
    ) -> SimResult<SimulationSummary> {
        let job_id = job.id;
        let started = Instant::now();
        let token = cancel.child_token();
        self.in_flight.lock().await.insert(job_id, token.clone());

        info!(
            "job started job_id={} worker={} recipe={} range={}..={}",
            job_id, worker_id, job.recipe.name, job.range.start, job.range.end
        );
        let result = self.run_engine(&job, token).await;
        self.in_flight.lock().await.remove(&job_id);
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(outcome) => self.commit(job_id, worker_id, outcome, duration_ms).await,
            Err(SimError::Cancelled) => {
                info!(
                    "job cancelled mid-run job_id={} worker={} elapsed_ms={}",
                    job_id, worker_id, duration_ms
                );
                Err(SimError::Cancelled)
            }
            Err(err @ SimError::Persistence(_)) => {
                error!(
                    "job could not load its inputs job_id={} worker={} error={}",
                    job_id, worker_id, err
                );
                Err(err)
            }
            Err(err) => {
                warn!(
                    "job failed job_id={} worker={} error={}",
                    job_id, worker_id, err
                );
                match self.store.fail(job_id, worker_id, &err, duration_ms).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        "failure not recorded, job no longer owned job_id={} worker={}",
                        job_id, worker_id
                    ),
                    Err(e) => error!("failed to mark job failed job_id={} error={}", job_id, e),
                }
                Err(err)
            }
        }
    }

    async fn run_engine(
        &self,
        job: &Simulation,
        token: CancellationToken,
    ) -> SimResult<BacktestOutcome> {
        let history = self.draws.history(job.range.end).await?;
        let engine = self.engine.clone();
        let recipe = job.recipe.clone();
        let range = job.range;
        let seed = job.job_seed();

        tokio::task::spawn_blocking(move || engine.run(&recipe, range, &history, seed, &token))
            .await
            .map_err(|e| SimError::Execution {
                message: format!("backtest task aborted: {e}"),
                detail: format!("{e:?}"),
            })?
    }

    async fn commit(
        &self,
        job_id: i32,
        worker_id: &str,
        outcome: BacktestOutcome,
        duration_ms: i64,
    ) -> SimResult<SimulationSummary> {
        match self
            .store
            .complete(job_id, worker_id, &outcome, duration_ms)
            .await
        {
            Ok(true) => {
                info!(
                    "job completed job_id={} worker={} contests={} average_hits={:.4} duration_ms={}",
                    job_id,
                    worker_id,
                    outcome.summary.total_contests,
                    outcome.summary.average_hits,
                    duration_ms
                );
                Ok(outcome.summary)
            }
            Ok(false) => {
                warn!(
                    "results discarded, job no longer owned job_id={} worker={}",
                    job_id, worker_id
                );
                Err(SimError::InvalidState(format!(
                    "simulation {job_id} is no longer owned by {worker_id}"
                )))
            }
            Err(e) => {
                error!(
                    "result commit failed, job remains running job_id={} worker={} error={}",
                    job_id, worker_id, e
                );
                Err(e)
            }
        }
    }

    /// Aborts the in-process run of `job_id`, if any. Returns whether one was found.
    pub async fn cancel_running(&self, job_id: i32) -> bool {
        match self.in_flight.lock().await.get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn running_jobs(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.in_flight.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::draw::{Draw, DrawHistory};
    use crate::backtest::model::{ContestRange, JobStatus, Prediction};
    use crate::backtest::predictor::{HitScorer, Predictor, WeightedFrequencyPredictor};
    use crate::backtest::recipe::{Recipe, RecipeParameters};
    use crate::backtest::store::flaky::FlakyStore;
    use crate::backtest::store::SqlStore;
    use crate::storage::establish_in_memory;
    use crate::storage::repository::{DrawRepository, SimulationRepository};

    /// Cancels its token once it is asked about a window of `after` draws.
    struct CancelAfter {
        after: usize,
        token: CancellationToken,
    }

    impl Predictor for CancelAfter {
        fn generate_predictions(
            &self,
            history: &[Draw],
            _params: &RecipeParameters,
            count: usize,
            _seed: u64,
        ) -> anyhow::Result<Vec<Prediction>> {
            if history.len() >= self.after {
                self.token.cancel();
            }
            Ok(vec![Prediction::new(vec![1, 2, 3, 4, 5]); count])
        }
    }

    struct Broken;

    impl Predictor for Broken {
        fn generate_predictions(
            &self,
            _history: &[Draw],
            _params: &RecipeParameters,
            _count: usize,
            _seed: u64,
        ) -> anyhow::Result<Vec<Prediction>> {
            anyhow::bail!("model weights missing")
        }
    }

    async fn setup(predictor: Arc<dyn Predictor>) -> (Arc<SqlStore>, JobExecutor) {
        let db = Arc::new(establish_in_memory().await.unwrap());
        let draws: Vec<Draw> = (1..=10)
            .map(|c| {
                let b = c as u8;
                Draw::new(c, [b, b + 1, b + 2, b + 3, b + 4]).unwrap()
            })
            .collect();
        DrawRepository::upsert_many(db.as_ref(), &draws).await.unwrap();
        let store = Arc::new(SqlStore::new(db));
        let engine = BacktestEngine::new(predictor, Arc::new(HitScorer));
        let executor = JobExecutor::new(store.clone(), store.clone(), engine);
        (store, executor)
    }

    fn recipe() -> Recipe {
        Recipe::new(
            "exec",
            RecipeParameters {
                sim_prev_max: 10,
                sim_preds: 3,
                ..RecipeParameters::default()
            },
        )
    }

    #[tokio::test]
    async fn completed_run_persists_summary_and_rows() {
        let (store, executor) = setup(Arc::new(WeightedFrequencyPredictor)).await;
        let job = store
            .create(&recipe(), ContestRange::new(1, 10).unwrap())
            .await
            .unwrap();
        let claimed = store.claim_pending("w1").await.unwrap().unwrap();

        let summary = executor
            .execute(claimed, "w1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.total_contests, 10);

        let done = store.get(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.summary, Some(summary));
        let rows = SimulationRepository::count_results(store.db().as_ref(), job.id)
            .await
            .unwrap();
        assert_eq!(rows, 10);
        assert!(executor.running_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_commits_nothing_and_keeps_status() {
        let token = CancellationToken::new();
        // contest 4 is the first with three earlier draws; contest 4 finishes,
        // the check before contest 5 aborts
        let predictor = Arc::new(CancelAfter {
            after: 3,
            token: token.clone(),
        });
        let (store, executor) = setup(predictor).await;
        let job = store
            .create(&recipe(), ContestRange::new(1, 10).unwrap())
            .await
            .unwrap();
        let claimed = store.claim_pending("w1").await.unwrap().unwrap();

        let err = executor.execute(claimed, "w1", &token).await.unwrap_err();
        assert!(err.is_cancelled());

        let after = store.get(job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Running);
        let rows = SimulationRepository::count_results(store.db().as_ref(), job.id)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn predictor_error_marks_job_failed() {
        let (store, executor) = setup(Arc::new(Broken)).await;
        let job = store
            .create(&recipe(), ContestRange::new(2, 4).unwrap())
            .await
            .unwrap();
        let claimed = store.claim_pending("w1").await.unwrap().unwrap();

        let err = executor
            .execute(claimed, "w1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Execution { .. }));

        let failed = store.get(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        let message = failed.error_message.unwrap();
        assert!(message.contains("predictor failed at contest 2"));
        assert!(message.contains("model weights missing"));
        assert!(failed.error_detail.is_some());
    }

    #[tokio::test]
    async fn commit_error_leaves_job_running_without_rows() {
        let (store, _) = setup(Arc::new(WeightedFrequencyPredictor)).await;
        let flaky = Arc::new(FlakyStore::new(store.as_ref().clone()));
        let engine = BacktestEngine::new(Arc::new(WeightedFrequencyPredictor), Arc::new(HitScorer));
        let executor = JobExecutor::new(flaky.clone(), store.clone(), engine);

        let job = store
            .create(&recipe(), ContestRange::new(1, 10).unwrap())
            .await
            .unwrap();
        flaky.break_commit(job.id);
        let claimed = store.claim_pending("w1").await.unwrap().unwrap();

        let err = executor
            .execute(claimed, "w1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Persistence(_)));

        let after = store.get(job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Running);
        assert_eq!(after.worker_id.as_deref(), Some("w1"));
        assert!(after.error_message.is_none());
        let rows = SimulationRepository::count_results(store.db().as_ref(), job.id)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn history_is_loaded_up_to_range_end() {
        let (store, _executor) = setup(Arc::new(WeightedFrequencyPredictor)).await;
        let history: DrawHistory = store.history(6).await.unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.get(7).is_none());
    }
}
