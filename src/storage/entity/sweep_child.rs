use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Link between a sweep and one of its child simulations.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "sweep_children")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub sweep_id: i32,
    #[sea_orm(unique)]
    pub simulation_id: i32,
    pub variation_index: i32,
    pub assignment_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sweep_job::Entity",
        from = "Column::SweepId",
        to = "super::sweep_job::Column::Id",
        on_delete = "Cascade"
    )]
    SweepJob,
    #[sea_orm(
        belongs_to = "super::simulation::Entity",
        from = "Column::SimulationId",
        to = "super::simulation::Column::Id",
        on_delete = "Cascade"
    )]
    Simulation,
}

impl Related<super::sweep_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SweepJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
