use quinasim::backtest::draw::Draw;
use quinasim::backtest::model::{ContestRange, JobStatus};
use quinasim::backtest::predictor::{HitScorer, WeightedFrequencyPredictor};
use quinasim::backtest::{BacktestEngine, PoolConfig, SimulationService, WorkerPool};
use quinasim::ranking::Metric;
use quinasim::storage::establish_in_memory;
use quinasim::sweep::SweepConfig;
use std::sync::Arc;
use std::time::Duration;

fn draws() -> Vec<Draw> {
    (1..=60)
        .map(|c| {
            let b = ((c * 7) % 70) as u8 + 1;
            Draw::new(c, [b, b + 1, b + 3, b + 6, b + 10]).unwrap()
        })
        .collect()
}

fn sweep_config() -> SweepConfig {
    serde_json::from_value(serde_json::json!({
        "name": "weights",
        "baseRecipe": {
            "name": "freq",
            "parameters": {
                "alpha": 1.0, "beta": 0.5, "gamma": 0.25, "delta": 0.1,
                "simPrevMax": 20, "simPreds": 6, "seed": 42
            }
        },
        "parameters": [
            {"name": "alpha", "type": "range", "min": 0.0, "max": 1.0, "step": 0.5},
            {"name": "sim_preds", "type": "list", "values": [2, 6]}
        ]
    }))
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_runs_to_completion_and_reports_best() {
    let db = Arc::new(establish_in_memory().await.unwrap());
    let engine = BacktestEngine::new(Arc::new(WeightedFrequencyPredictor), Arc::new(HitScorer));
    let service = Arc::new(SimulationService::new(db, engine, 100));
    service.import_draws(&draws()).await.unwrap();

    let sweep = service
        .create_sweep(sweep_config(), ContestRange::new(30, 60).unwrap())
        .await
        .unwrap();
    assert_eq!(sweep.total_combinations, 6);

    let mut pool = WorkerPool::new(
        service.job_store(),
        service.executor(),
        PoolConfig {
            concurrency: 3,
            poll_interval: Duration::from_millis(10),
            lease_timeout: None,
        },
    );
    pool.start().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        let report = service.get_sweep_status(sweep.id).await.unwrap();
        if report.status == JobStatus::Completed {
            break;
        }
        assert!(
            !report.status.is_terminal(),
            "sweep ended as {}",
            report.status
        );
        assert!(tokio::time::Instant::now() < deadline, "sweep did not finish");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    pool.shutdown().await;

    let saved = service.update_sweep_progress(sweep.id).await.unwrap();
    assert_eq!(saved.sweep.status, JobStatus::Completed);
    assert_eq!(saved.sweep.completed_count, 6);
    assert!(saved.sweep.finished_at.is_some());

    let points = service
        .sweep_results(sweep.id, Metric::AverageHits)
        .await
        .unwrap();
    assert_eq!(points.len(), 6);
    let top = points
        .iter()
        .filter_map(|p| p.value)
        .fold(f64::MIN, f64::max);

    let best = service
        .find_best(sweep.id, Metric::AverageHits)
        .await
        .unwrap();
    assert_eq!(best.value, top);
    assert_eq!(best.rank, 1);
    assert_eq!(best.percentile, 100.0);
    assert_eq!(best.assignment.len(), 2);

    // siblings share the recipe seed, so a rerun of the best child reproduces it
    let child = service.get_simulation(best.simulation_id).await.unwrap();
    let rerun = service
        .create_simulation(child.recipe.clone(), child.range, false)
        .await
        .unwrap();
    assert_eq!(rerun.summary, child.summary);
}
