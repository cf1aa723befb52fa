pub mod draw;
pub mod engine;
pub mod executor;
pub mod model;
pub mod predictor;
pub mod recipe;
pub mod service;
pub mod store;
pub mod worker;

pub use engine::BacktestEngine;
pub use executor::JobExecutor;
pub use model::{ContestRange, JobStatus, Page, Simulation, SimulationSummary};
pub use recipe::{Recipe, RecipeParameters};
pub use service::SimulationService;
pub use store::{DrawSource, JobStore, SqlStore};
pub use worker::{JobEvent, PoolConfig, WorkerPool};
