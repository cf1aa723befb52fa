use crate::storage::entity::sweep_child::{self, ActiveModel as SweepChildActiveModel};
use crate::storage::entity::sweep_job::{self, ActiveModel as SweepJobActiveModel};
use crate::storage::entity::{SweepChild, SweepJob};
use crate::storage::now_ms;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};

// keeps each insert under sqlite's bound-parameter limit
const LINK_CHUNK: usize = 200;

#[derive(Debug, Clone)]
pub struct NewSweep {
    pub name: String,
    pub config_json: String,
    pub start_contest: i32,
    pub end_contest: i32,
    pub total_combinations: i32,
}

#[derive(Debug, Clone)]
pub struct NewSweepChild {
    pub simulation_id: i32,
    pub variation_index: i32,
    pub assignment_json: String,
}

/// Derived progress written back onto the parent row.
#[derive(Debug, Clone)]
pub struct SweepProgress {
    pub status: String,
    pub completed_count: i32,
    pub failed_count: i32,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
}

pub struct SweepRepository;

impl SweepRepository {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        new: NewSweep,
    ) -> Result<sweep_job::Model, DbErr> {
        let now = now_ms();
        let active_model = SweepJobActiveModel {
            name: Set(new.name),
            config_json: Set(new.config_json),
            start_contest: Set(new.start_contest),
            end_contest: Set(new.end_contest),
            status: Set("pending".to_string()),
            total_combinations: Set(new.total_combinations),
            completed_count: Set(0),
            failed_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        active_model.insert(db).await
    }

    pub async fn link_children<C: ConnectionTrait>(
        db: &C,
        sweep_id: i32,
        children: Vec<NewSweepChild>,
    ) -> Result<(), DbErr> {
        if children.is_empty() {
            return Ok(());
        }
        for chunk in children.chunks(LINK_CHUNK) {
            let models = chunk.iter().map(|c| SweepChildActiveModel {
                sweep_id: Set(sweep_id),
                simulation_id: Set(c.simulation_id),
                variation_index: Set(c.variation_index),
                assignment_json: Set(c.assignment_json.clone()),
                ..Default::default()
            });
            SweepChild::insert_many(models).exec(db).await?;
        }
        Ok(())
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<sweep_job::Model>, DbErr> {
        SweepJob::find_by_id(id).one(db).await
    }

    pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<sweep_job::Model>, DbErr> {
        SweepJob::find()
            .order_by_desc(sweep_job::Column::Id)
            .all(db)
            .await
    }

    pub async fn children<C: ConnectionTrait>(
        db: &C,
        sweep_id: i32,
    ) -> Result<Vec<sweep_child::Model>, DbErr> {
        SweepChild::find()
            .filter(sweep_child::Column::SweepId.eq(sweep_id))
            .order_by_asc(sweep_child::Column::VariationIndex)
            .all(db)
            .await
    }

    /// Sweep that `simulation_id` belongs to, if any.
    pub async fn sweep_of<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
    ) -> Result<Option<i32>, DbErr> {
        Ok(SweepChild::find()
            .filter(sweep_child::Column::SimulationId.eq(simulation_id))
            .one(db)
            .await?
            .map(|c| c.sweep_id))
    }

    pub async fn save_progress<C: ConnectionTrait>(
        db: &C,
        id: i32,
        progress: SweepProgress,
    ) -> Result<sweep_job::Model, DbErr> {
        let update = SweepJobActiveModel {
            id: Set(id),
            status: Set(progress.status),
            completed_count: Set(progress.completed_count),
            failed_count: Set(progress.failed_count),
            started_at: Set(progress.started_at),
            finished_at: Set(progress.finished_at),
            duration_ms: Set(progress.duration_ms),
            updated_at: Set(now_ms()),
            ..Default::default()
        };
        update.update(db).await
    }
}
