pub mod contest_result;
pub mod draw;
pub mod simulation;
pub mod sweep_child;
pub mod sweep_job;

pub use contest_result::Entity as ContestResult;
pub use draw::Entity as DrawRecord;
pub use simulation::Entity as Simulation;
pub use sweep_child::Entity as SweepChild;
pub use sweep_job::Entity as SweepJob;
