use crate::backtest::draw::DrawHistory;
use crate::backtest::model::{
    BacktestOutcome, ContestOutcome, ContestRange, JobStatus, Page, Prediction, Simulation,
    SimulationSummary,
};
use crate::backtest::recipe::Recipe;
use crate::error::{SimError, SimResult};
use crate::storage::entity::{contest_result, simulation};
use crate::storage::repository::{DrawRepository, NewSimulation, SimulationRepository};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, Set};
use std::sync::Arc;

/// Persisted job queue. `claim_pending` and `claim` are the only ways a job
/// leaves `pending`, and at most one caller wins each job.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, recipe: &Recipe, range: ContestRange) -> SimResult<Simulation>;
    /// Creates the job directly in `running`, owned by `worker_id`.
    async fn create_claimed(
        &self,
        recipe: &Recipe,
        range: ContestRange,
        worker_id: &str,
    ) -> SimResult<Simulation>;
    async fn get(&self, id: i32) -> SimResult<Simulation>;
    async fn claim_pending(&self, worker_id: &str) -> SimResult<Option<Simulation>>;
    async fn claim(&self, id: i32, worker_id: &str) -> SimResult<Option<Simulation>>;
    /// Commits results and summary atomically. `Ok(false)` if the worker no
    /// longer owns the job (it was cancelled or reclaimed meanwhile).
    async fn complete(
        &self,
        id: i32,
        worker_id: &str,
        outcome: &BacktestOutcome,
        duration_ms: i64,
    ) -> SimResult<bool>;
    async fn fail(
        &self,
        id: i32,
        worker_id: &str,
        error: &SimError,
        duration_ms: i64,
    ) -> SimResult<bool>;
    async fn cancel(&self, id: i32) -> SimResult<Simulation>;
    async fn list_by_status(&self, status: JobStatus, page: Page) -> SimResult<Vec<Simulation>>;
    /// Running jobs started before `cutoff_ms` go back to pending.
    async fn reclaim_expired(&self, cutoff_ms: i64) -> SimResult<u64>;
}

#[async_trait]
pub trait DrawSource: Send + Sync {
    /// Every known draw with contest number `<= up_to`.
    async fn history(&self, up_to: i32) -> SimResult<DrawHistory>;
}

/// `JobStore` and `DrawSource` over the sea-orm database.
#[derive(Clone)]
pub struct SqlStore {
    db: Arc<DatabaseConnection>,
}

impl SqlStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<DatabaseConnection> {
        &self.db
    }
}

pub(crate) fn new_simulation(recipe: &Recipe, range: ContestRange) -> SimResult<NewSimulation> {
    Ok(NewSimulation {
        recipe_name: recipe.name.clone(),
        recipe_version: recipe.version as i32,
        recipe_json: serde_json::to_string(recipe)?,
        start_contest: range.start,
        end_contest: range.end,
    })
}

impl TryFrom<simulation::Model> for Simulation {
    type Error = SimError;

    fn try_from(m: simulation::Model) -> Result<Self, Self::Error> {
        let summary: Option<SimulationSummary> = m
            .summary_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Self {
            id: m.id,
            recipe: serde_json::from_str(&m.recipe_json)?,
            range: ContestRange {
                start: m.start_contest,
                end: m.end_contest,
            },
            status: m.status.parse()?,
            worker_id: m.worker_id,
            created_at: m.created_at,
            started_at: m.started_at,
            finished_at: m.finished_at,
            duration_ms: m.duration_ms,
            summary,
            error_message: m.error_message,
            error_detail: m.error_detail,
        })
    }
}

impl TryFrom<contest_result::Model> for ContestOutcome {
    type Error = SimError;

    fn try_from(m: contest_result::Model) -> Result<Self, Self::Error> {
        let best_prediction: Option<Prediction> = m
            .best_prediction_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Self {
            contest: m.contest,
            actual: serde_json::from_str(&m.actual_json)?,
            best_hits: m.best_hits as u8,
            best_prediction,
            predictions: serde_json::from_str(&m.predictions_json)?,
        })
    }
}

fn contest_row(simulation_id: i32, c: &ContestOutcome) -> SimResult<contest_result::ActiveModel> {
    Ok(contest_result::ActiveModel {
        simulation_id: Set(simulation_id),
        contest: Set(c.contest),
        actual_json: Set(serde_json::to_string(&c.actual)?),
        best_hits: Set(i32::from(c.best_hits)),
        best_prediction_json: Set(c
            .best_prediction
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?),
        predictions_json: Set(serde_json::to_string(&c.predictions)?),
        ..Default::default()
    })
}

fn to_domain(model: Option<simulation::Model>) -> SimResult<Option<Simulation>> {
    model.map(Simulation::try_from).transpose()
}

#[async_trait]
impl JobStore for SqlStore {
    async fn create(&self, recipe: &Recipe, range: ContestRange) -> SimResult<Simulation> {
        let model = SimulationRepository::create(self.db.as_ref(), new_simulation(recipe, range)?)
            .await?;
        model.try_into()
    }

    async fn create_claimed(
        &self,
        recipe: &Recipe,
        range: ContestRange,
        worker_id: &str,
    ) -> SimResult<Simulation> {
        let model = SimulationRepository::create_claimed(
            self.db.as_ref(),
            new_simulation(recipe, range)?,
            worker_id,
        )
        .await?;
        model.try_into()
    }

    async fn get(&self, id: i32) -> SimResult<Simulation> {
        to_domain(SimulationRepository::find(self.db.as_ref(), id).await?)?
            .ok_or(SimError::not_found("simulation", id))
    }

    async fn claim_pending(&self, worker_id: &str) -> SimResult<Option<Simulation>> {
        to_domain(SimulationRepository::claim_next(self.db.as_ref(), worker_id).await?)
    }

    async fn claim(&self, id: i32, worker_id: &str) -> SimResult<Option<Simulation>> {
        to_domain(SimulationRepository::claim(self.db.as_ref(), id, worker_id).await?)
    }

    async fn complete(
        &self,
        id: i32,
        worker_id: &str,
        outcome: &BacktestOutcome,
        duration_ms: i64,
    ) -> SimResult<bool> {
        let rows = outcome
            .contests
            .iter()
            .map(|c| contest_row(id, c))
            .collect::<SimResult<Vec<_>>>()?;
        let summary_json = serde_json::to_string(&outcome.summary)?;
        Ok(SimulationRepository::complete(
            self.db.as_ref(),
            id,
            worker_id,
            summary_json,
            duration_ms,
            rows,
        )
        .await?)
    }

    async fn fail(
        &self,
        id: i32,
        worker_id: &str,
        error: &SimError,
        duration_ms: i64,
    ) -> SimResult<bool> {
        let (message, detail) = error.failure_text();
        Ok(SimulationRepository::fail(
            self.db.as_ref(),
            id,
            worker_id,
            message,
            detail,
            duration_ms,
        )
        .await?)
    }

    async fn cancel(&self, id: i32) -> SimResult<Simulation> {
        let changed = SimulationRepository::cancel(self.db.as_ref(), id).await?;
        let job = self.get(id).await?;
        if changed == 0 {
            return Err(SimError::InvalidState(format!(
                "simulation {id} is already {}",
                job.status
            )));
        }
        Ok(job)
    }

    async fn list_by_status(&self, status: JobStatus, page: Page) -> SimResult<Vec<Simulation>> {
        SimulationRepository::list_by_status(
            self.db.as_ref(),
            status.as_str(),
            page.page,
            page.per_page,
        )
        .await?
        .into_iter()
        .map(Simulation::try_from)
        .collect()
    }

    async fn reclaim_expired(&self, cutoff_ms: i64) -> SimResult<u64> {
        Ok(SimulationRepository::reclaim_expired(self.db.as_ref(), cutoff_ms).await?)
    }
}

#[async_trait]
impl DrawSource for SqlStore {
    async fn history(&self, up_to: i32) -> SimResult<DrawHistory> {
        let draws = DrawRepository::load_up_to(self.db.as_ref(), up_to).await?;
        Ok(DrawHistory::new(draws))
    }
}

/// `SqlStore` with injectable persistence failures.
#[cfg(test)]
pub(crate) mod flaky {
    use super::*;
    use sea_orm::DbErr;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct FlakyStore {
        pub inner: SqlStore,
        /// Upcoming `claim_pending` calls that fail before touching the db.
        pub claim_failures: AtomicUsize,
        pub claim_calls: AtomicUsize,
        /// Jobs whose `complete` fails.
        pub broken_commits: Mutex<HashSet<i32>>,
    }

    impl FlakyStore {
        pub fn new(inner: SqlStore) -> Self {
            Self {
                inner,
                claim_failures: AtomicUsize::new(0),
                claim_calls: AtomicUsize::new(0),
                broken_commits: Mutex::new(HashSet::new()),
            }
        }

        pub fn break_commit(&self, id: i32) {
            self.broken_commits.lock().unwrap().insert(id);
        }
    }

    fn db_down() -> SimError {
        SimError::Persistence(DbErr::Custom("database unavailable".into()))
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn create(&self, recipe: &Recipe, range: ContestRange) -> SimResult<Simulation> {
            self.inner.create(recipe, range).await
        }

        async fn create_claimed(
            &self,
            recipe: &Recipe,
            range: ContestRange,
            worker_id: &str,
        ) -> SimResult<Simulation> {
            self.inner.create_claimed(recipe, range, worker_id).await
        }

        async fn get(&self, id: i32) -> SimResult<Simulation> {
            self.inner.get(id).await
        }

        async fn claim_pending(&self, worker_id: &str) -> SimResult<Option<Simulation>> {
            self.claim_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .claim_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(db_down());
            }
            self.inner.claim_pending(worker_id).await
        }

        async fn claim(&self, id: i32, worker_id: &str) -> SimResult<Option<Simulation>> {
            self.inner.claim(id, worker_id).await
        }

        async fn complete(
            &self,
            id: i32,
            worker_id: &str,
            outcome: &BacktestOutcome,
            duration_ms: i64,
        ) -> SimResult<bool> {
            if self.broken_commits.lock().unwrap().contains(&id) {
                return Err(db_down());
            }
            self.inner.complete(id, worker_id, outcome, duration_ms).await
        }

        async fn fail(
            &self,
            id: i32,
            worker_id: &str,
            error: &SimError,
            duration_ms: i64,
        ) -> SimResult<bool> {
            self.inner.fail(id, worker_id, error, duration_ms).await
        }

        async fn cancel(&self, id: i32) -> SimResult<Simulation> {
            self.inner.cancel(id).await
        }

        async fn list_by_status(&self, status: JobStatus, page: Page) -> SimResult<Vec<Simulation>> {
            self.inner.list_by_status(status, page).await
        }

        async fn reclaim_expired(&self, cutoff_ms: i64) -> SimResult<u64> {
            self.inner.reclaim_expired(cutoff_ms).await
        }
    }
}
