use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "sweep_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub config_json: String,
    pub start_contest: i32,
    pub end_contest: i32,
    pub status: String, // derived from children, see SweepCoordinator
    pub total_combinations: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sweep_child::Entity")]
    SweepChild,
}

impl Related<super::sweep_child::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SweepChild.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
