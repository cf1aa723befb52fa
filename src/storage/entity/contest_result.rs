use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "contest_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub simulation_id: i32,
    pub contest: i32,
    pub actual_json: String,
    pub best_hits: i32,
    pub best_prediction_json: Option<String>,
    pub predictions_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::simulation::Entity",
        from = "Column::SimulationId",
        to = "super::simulation::Column::Id",
        on_delete = "Cascade"
    )]
    Simulation,
}

impl Related<super::simulation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Simulation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
