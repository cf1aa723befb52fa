pub mod coordinator;
pub mod generator;
pub mod model;

pub use coordinator::SweepCoordinator;
pub use model::{
    BestConfiguration, GeneratedRecipe, ParameterSweep, SweepConfig, SweepJob, SweepPoint,
    SweepStatusReport, SweepValues,
};
