use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "simulations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub recipe_name: String,
    pub recipe_version: i32,
    pub recipe_json: String,
    pub start_contest: i32,
    pub end_contest: i32,
    pub status: String, // pending/running/completed/failed/cancelled
    pub worker_id: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub summary_json: Option<String>,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::contest_result::Entity")]
    ContestResult,
}

impl Related<super::contest_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ContestResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
