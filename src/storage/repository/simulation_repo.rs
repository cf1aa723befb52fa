use crate::storage::entity::contest_result::{self, ActiveModel as ContestResultActiveModel};
use crate::storage::entity::simulation::{
    self, ActiveModel as SimulationActiveModel, Entity as Simulation,
};
use crate::storage::entity::ContestResult;
use crate::storage::now_ms;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

const PENDING: &str = "pending";
const RUNNING: &str = "running";
const COMPLETED: &str = "completed";
const FAILED: &str = "failed";
const CANCELLED: &str = "cancelled";

// rows per insert, under sqlite's bound-parameter limit
const RESULT_CHUNK: usize = 500;

/// Column values for a new job row.
#[derive(Debug, Clone)]
pub struct NewSimulation {
    pub recipe_name: String,
    pub recipe_version: i32,
    pub recipe_json: String,
    pub start_contest: i32,
    pub end_contest: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

pub struct SimulationRepository;

impl SimulationRepository {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        new: NewSimulation,
    ) -> Result<simulation::Model, DbErr> {
        let now = now_ms();
        let active_model = SimulationActiveModel {
            recipe_name: Set(new.recipe_name),
            recipe_version: Set(new.recipe_version),
            recipe_json: Set(new.recipe_json),
            start_contest: Set(new.start_contest),
            end_contest: Set(new.end_contest),
            status: Set(PENDING.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        active_model.insert(db).await
    }

    /// Inserts a job already owned by `worker_id`, so no poller can claim it.
    pub async fn create_claimed<C: ConnectionTrait>(
        db: &C,
        new: NewSimulation,
        worker_id: &str,
    ) -> Result<simulation::Model, DbErr> {
        let now = now_ms();
        let active_model = SimulationActiveModel {
            recipe_name: Set(new.recipe_name),
            recipe_version: Set(new.recipe_version),
            recipe_json: Set(new.recipe_json),
            start_contest: Set(new.start_contest),
            end_contest: Set(new.end_contest),
            status: Set(RUNNING.to_string()),
            worker_id: Set(Some(worker_id.to_string())),
            started_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        active_model.insert(db).await
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<simulation::Model>, DbErr> {
        Simulation::find_by_id(id).one(db).await
    }

    pub async fn find_many<C: ConnectionTrait>(
        db: &C,
        ids: &[i32],
    ) -> Result<Vec<simulation::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Simulation::find()
            .filter(simulation::Column::Id.is_in(ids.iter().copied()))
            .order_by_asc(simulation::Column::Id)
            .all(db)
            .await
    }

    /// Claims the oldest pending job for `worker_id`.
    ///
    /// The candidate is read first and then taken with a conditional update
    /// that only matches while the row is still pending; losing that race
    /// means another worker got it, so look again.
    pub async fn claim_next<C: ConnectionTrait>(
        db: &C,
        worker_id: &str,
    ) -> Result<Option<simulation::Model>, DbErr> {
        loop {
            let candidate = Simulation::find()
                .filter(simulation::Column::Status.eq(PENDING))
                .order_by_asc(simulation::Column::Id)
                .one(db)
                .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            if let Some(claimed) = Self::claim(db, candidate.id, worker_id).await? {
                return Ok(Some(claimed));
            }
        }
    }

    /// pending -> running for one row. `None` when the row was not pending.
    pub async fn claim<C: ConnectionTrait>(
        db: &C,
        id: i32,
        worker_id: &str,
    ) -> Result<Option<simulation::Model>, DbErr> {
        let now = now_ms();
        let res = Simulation::update_many()
            .col_expr(simulation::Column::Status, Expr::value(RUNNING))
            .col_expr(
                simulation::Column::WorkerId,
                Expr::value(worker_id.to_string()),
            )
            .col_expr(simulation::Column::StartedAt, Expr::value(now))
            .col_expr(simulation::Column::UpdatedAt, Expr::value(now))
            .filter(simulation::Column::Id.eq(id))
            .filter(simulation::Column::Status.eq(PENDING))
            .exec(db)
            .await?;

        if res.rows_affected == 0 {
            return Ok(None);
        }
        Simulation::find_by_id(id).one(db).await
    }

    /// Stores contest rows and the summary in one transaction. Returns
    /// `false` (and writes nothing) if `worker_id` no longer owns a running job.
    pub async fn complete(
        db: &DatabaseConnection,
        id: i32,
        worker_id: &str,
        summary_json: String,
        duration_ms: i64,
        results: Vec<ContestResultActiveModel>,
    ) -> Result<bool, DbErr> {
        let txn = db.begin().await?;
        let now = now_ms();

        let res = Simulation::update_many()
            .col_expr(simulation::Column::Status, Expr::value(COMPLETED))
            .col_expr(simulation::Column::SummaryJson, Expr::value(summary_json))
            .col_expr(simulation::Column::FinishedAt, Expr::value(now))
            .col_expr(simulation::Column::DurationMs, Expr::value(duration_ms))
            .col_expr(simulation::Column::UpdatedAt, Expr::value(now))
            .filter(simulation::Column::Id.eq(id))
            .filter(simulation::Column::Status.eq(RUNNING))
            .filter(simulation::Column::WorkerId.eq(worker_id))
            .exec(&txn)
            .await?;

        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        let mut rows = results.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<_> = rows.by_ref().take(RESULT_CHUNK).collect();
            if let Err(e) = ContestResult::insert_many(chunk).exec(&txn).await {
                txn.rollback().await?;
                return Err(e);
            }
        }

        txn.commit().await?;
        Ok(true)
    }

    pub async fn fail<C: ConnectionTrait>(
        db: &C,
        id: i32,
        worker_id: &str,
        message: String,
        detail: String,
        duration_ms: i64,
    ) -> Result<bool, DbErr> {
        let now = now_ms();
        let res = Simulation::update_many()
            .col_expr(simulation::Column::Status, Expr::value(FAILED))
            .col_expr(simulation::Column::ErrorMessage, Expr::value(message))
            .col_expr(simulation::Column::ErrorDetail, Expr::value(detail))
            .col_expr(simulation::Column::FinishedAt, Expr::value(now))
            .col_expr(simulation::Column::DurationMs, Expr::value(duration_ms))
            .col_expr(simulation::Column::UpdatedAt, Expr::value(now))
            .filter(simulation::Column::Id.eq(id))
            .filter(simulation::Column::Status.eq(RUNNING))
            .filter(simulation::Column::WorkerId.eq(worker_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// pending|running -> cancelled. Returns rows changed.
    pub async fn cancel<C: ConnectionTrait>(db: &C, id: i32) -> Result<u64, DbErr> {
        let now = now_ms();
        let res = Simulation::update_many()
            .col_expr(simulation::Column::Status, Expr::value(CANCELLED))
            .col_expr(simulation::Column::FinishedAt, Expr::value(now))
            .col_expr(simulation::Column::UpdatedAt, Expr::value(now))
            .filter(simulation::Column::Id.eq(id))
            .filter(simulation::Column::Status.is_in([PENDING, RUNNING]))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn list_by_status<C: ConnectionTrait>(
        db: &C,
        status: &str,
        page: u64,
        per_page: u64,
    ) -> Result<Vec<simulation::Model>, DbErr> {
        Simulation::find()
            .filter(simulation::Column::Status.eq(status))
            .order_by_asc(simulation::Column::Id)
            .paginate(db, per_page.max(1))
            .fetch_page(page)
            .await
    }

    pub async fn find_completed<C: ConnectionTrait>(
        db: &C,
        recipe_name: Option<&str>,
    ) -> Result<Vec<simulation::Model>, DbErr> {
        let mut query = Simulation::find().filter(simulation::Column::Status.eq(COMPLETED));
        if let Some(name) = recipe_name {
            query = query.filter(simulation::Column::RecipeName.eq(name));
        }
        query.order_by_asc(simulation::Column::Id).all(db).await
    }

    /// Puts running jobs started before `cutoff_ms` back to pending.
    pub async fn reclaim_expired<C: ConnectionTrait>(
        db: &C,
        cutoff_ms: i64,
    ) -> Result<u64, DbErr> {
        let now = now_ms();
        let res = Simulation::update_many()
            .col_expr(simulation::Column::Status, Expr::value(PENDING))
            .col_expr(
                simulation::Column::WorkerId,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                simulation::Column::StartedAt,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(simulation::Column::UpdatedAt, Expr::value(now))
            .filter(simulation::Column::Status.eq(RUNNING))
            .filter(simulation::Column::StartedAt.lt(cutoff_ms))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn contest_results<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
    ) -> Result<Vec<contest_result::Model>, DbErr> {
        ContestResult::find()
            .filter(contest_result::Column::SimulationId.eq(simulation_id))
            .order_by_asc(contest_result::Column::Contest)
            .all(db)
            .await
    }

    pub async fn count_results<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
    ) -> Result<u64, DbErr> {
        ContestResult::find()
            .filter(contest_result::Column::SimulationId.eq(simulation_id))
            .count(db)
            .await
    }

    /// Deletes a job that is not running; contest rows and sweep links go with it.
    pub async fn delete(db: &DatabaseConnection, id: i32) -> Result<u64, DbErr> {
        let txn = db.begin().await?;
        ContestResult::delete_many()
            .filter(contest_result::Column::SimulationId.eq(id))
            .exec(&txn)
            .await?;
        let res = Simulation::delete_many()
            .filter(simulation::Column::Id.eq(id))
            .filter(simulation::Column::Status.ne(RUNNING))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(0);
        }
        txn.commit().await?;
        Ok(res.rows_affected)
    }

    pub async fn get_stats<C: ConnectionTrait>(db: &C) -> Result<JobStats, DbErr> {
        let count = move |status: &'static str| {
            Simulation::find()
                .filter(simulation::Column::Status.eq(status))
                .count(db)
        };
        Ok(JobStats {
            total: Simulation::find().count(db).await?,
            pending: count(PENDING).await?,
            running: count(RUNNING).await?,
            completed: count(COMPLETED).await?,
            failed: count(FAILED).await?,
            cancelled: count(CANCELLED).await?,
        })
    }
}
