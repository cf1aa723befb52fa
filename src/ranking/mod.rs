pub mod engine;
pub mod leaderboard;
pub mod metric;

pub use engine::{compare, rank, stats, Comparison, MetricComparison, RankedEntry, Stats};
pub use leaderboard::{leaderboard, LeaderboardEntry, LeaderboardFilter};
pub use metric::Metric;
