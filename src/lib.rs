pub mod backtest;
pub mod commands;
pub mod config;
pub mod error;
pub mod ranking;
pub mod storage;
pub mod sweep;

pub use error::{SimError, SimResult};
