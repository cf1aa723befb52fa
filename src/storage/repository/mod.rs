pub mod draw_repo;
pub mod simulation_repo;
pub mod sweep_repo;

pub use draw_repo::DrawRepository;
pub use simulation_repo::{JobStats, NewSimulation, SimulationRepository};
pub use sweep_repo::{NewSweep, NewSweepChild, SweepProgress, SweepRepository};
