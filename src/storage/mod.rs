pub mod connection;
pub mod entity;
pub mod repository;

pub use connection::{establish_connection, establish_in_memory};

/// Wall-clock time in epoch milliseconds, the unit of every `*_at` column.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
