use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://quinasim.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub worker_concurrency: usize,
    pub poll_interval: Duration,
    /// When set, running jobs started longer ago than this are put back to pending at pool start.
    pub lease_timeout: Option<Duration>,
    pub max_sweep_combinations: usize,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            worker_concurrency: 4,
            poll_interval: Duration::from_millis(500),
            lease_timeout: None,
            max_sweep_combinations: 10_000,
            log_dir: None,
        }
    }
}

impl Settings {
    /// Loads `.env` (if any) and reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let worker_concurrency = parse_opt::<usize>(get("WORKER_CONCURRENCY"), "WORKER_CONCURRENCY")?
            .unwrap_or(defaults.worker_concurrency);
        if worker_concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }

        let poll_interval = parse_opt::<u64>(get("POLL_INTERVAL_MS"), "POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let lease_timeout = parse_opt::<u64>(get("LEASE_TIMEOUT_SECS"), "LEASE_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let max_sweep_combinations =
            parse_opt::<usize>(get("MAX_SWEEP_COMBINATIONS"), "MAX_SWEEP_COMBINATIONS")?
                .unwrap_or(defaults.max_sweep_combinations);

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            worker_concurrency,
            poll_interval,
            lease_timeout,
            max_sweep_combinations,
            log_dir: get("QUINASIM_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_opt<T>(raw: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|v| v.parse::<T>().with_context(|| format!("invalid {key}: {v:?}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.worker_concurrency, 4);
        assert_eq!(s.poll_interval, Duration::from_millis(500));
        assert!(s.lease_timeout.is_none());
        assert_eq!(s.max_sweep_combinations, 10_000);
    }

    #[test]
    fn reads_overrides() {
        let s = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("WORKER_CONCURRENCY", "8"),
            ("POLL_INTERVAL_MS", "50"),
            ("LEASE_TIMEOUT_SECS", "600"),
            ("QUINASIM_LOG_DIR", "logs"),
        ]))
        .unwrap();
        assert_eq!(s.database_url, "sqlite::memory:");
        assert_eq!(s.worker_concurrency, 8);
        assert_eq!(s.poll_interval, Duration::from_millis(50));
        assert_eq!(s.lease_timeout, Some(Duration::from_secs(600)));
        assert_eq!(s.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = Settings::from_lookup(lookup(&[("POLL_INTERVAL_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_MS"));
        assert!(Settings::from_lookup(lookup(&[("WORKER_CONCURRENCY", "0")])).is_err());
    }
}
