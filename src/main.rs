use anyhow::Context;
use chrono::Local;
use log::info;
use quinasim::backtest::predictor::{HitScorer, WeightedFrequencyPredictor};
use quinasim::backtest::{BacktestEngine, JobEvent, PoolConfig, SimulationService, WorkerPool};
use quinasim::commands::{self, AppCommand, AppEvent};
use quinasim::config::Settings;
use quinasim::storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// `RUST_LOG`, when given, replaces the default filters rather than
/// being layered under them.
fn log_builder(rust_log: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    match rust_log {
        Some(filters) => {
            builder.parse_filters(filters);
        }
        None => {
            builder
                .filter_level(log::LevelFilter::Warn)
                .filter_module("quinasim", log::LevelFilter::Info)
                .filter_module("sqlx", log::LevelFilter::Error)
                .filter_module("sea_orm", log::LevelFilter::Error);
        }
    }
    builder
}

fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let mut builder = log_builder(rust_log.as_deref());

    // stdout belongs to the command prompt when a log dir is configured
    if let Some(dir) = &settings.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log dir {}", dir.display()))?;
        let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let log_file = std::fs::File::create(dir.join(format!("app-{}.log", ts)))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

fn print_event(event: AppEvent) {
    match event {
        AppEvent::Message(msg) => println!("{msg}"),
        AppEvent::Error(msg) => eprintln!("error: {msg}"),
        AppEvent::Job(JobEvent::Completed {
            job_id,
            worker_id,
            summary,
        }) => println!(
            "[{worker_id}] #{job_id} completed: contests={} quina={} quadra={} terno={} avg_hits={:.4}",
            summary.total_contests,
            summary.quina_hits,
            summary.quadra_hits,
            summary.terno_hits,
            summary.average_hits
        ),
        AppEvent::Job(JobEvent::Failed {
            job_id,
            worker_id,
            message,
        }) => eprintln!("[{worker_id}] #{job_id} failed: {message}"),
        AppEvent::Job(JobEvent::Cancelled { job_id, worker_id }) => {
            println!("[{worker_id}] #{job_id} cancelled")
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_logging(&settings)?;

    let db = Arc::new(
        storage::establish_connection(&settings.database_url)
            .await
            .with_context(|| format!("cannot open database {}", settings.database_url))?,
    );
    let engine = BacktestEngine::new(Arc::new(WeightedFrequencyPredictor), Arc::new(HitScorer));
    let service = Arc::new(SimulationService::new(
        db,
        engine,
        settings.max_sweep_combinations,
    ));

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (job_tx, mut job_rx) = mpsc::unbounded_channel::<JobEvent>();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();

    let mut pool = WorkerPool::new(
        service.job_store(),
        service.executor(),
        PoolConfig::from(&settings),
    )
    .with_events(job_tx);
    pool.start().await;

    {
        let tx = evt_tx.clone();
        tokio::spawn(async move {
            while let Some(ev) = job_rx.recv().await {
                let _ = tx.send(AppEvent::Job(ev));
            }
        });
    }
    let printer = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            print_event(ev);
        }
    });

    // command actor
    let actor = {
        let service = service.clone();
        let tx = evt_tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                commands::dispatch(cmd, &service, &tx).await;
            }
        })
    };

    let _ = evt_tx.send(AppEvent::Message(
        "quinasim ready, type `help` for commands".to_string(),
    ));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = evt_tx.send(AppEvent::Error(format!("stdin: {e}")));
                        break;
                    }
                };
                let cmd = line
                    .parse::<AppCommand>()
                    .unwrap_or_else(|never| match never {});
                if cmd == AppCommand::Quit {
                    break;
                }
                if cmd_tx.send(cmd).is_err() {
                    break;
                }
            }
        }
    }

    let _ = evt_tx.send(AppEvent::Message("stopping workers...".to_string()));
    drop(cmd_tx);
    let _ = actor.await;
    pool.shutdown().await;
    drop(pool);
    drop(evt_tx);
    let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata};

    fn enabled(logger: &env_logger::Logger, target: &str, level: Level) -> bool {
        logger.enabled(&Metadata::builder().target(target).level(level).build())
    }

    #[test]
    fn defaults_apply_without_rust_log() {
        let logger = log_builder(None).build();
        assert!(enabled(&logger, "quinasim::backtest::worker", Level::Info));
        assert!(!enabled(&logger, "sea_orm::driver", Level::Warn));
        assert!(!enabled(&logger, "hyper", Level::Info));
    }

    #[test]
    fn rust_log_replaces_defaults() {
        let logger = log_builder(Some("sea_orm=debug,quinasim=warn")).build();
        assert!(enabled(&logger, "sea_orm::driver", Level::Debug));
        assert!(!enabled(&logger, "quinasim::backtest::worker", Level::Info));
    }
}
