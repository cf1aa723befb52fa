use quinasim::backtest::model::{ContestRange, JobStatus};
use quinasim::backtest::recipe::{Recipe, RecipeParameters};
use quinasim::backtest::store::{JobStore, SqlStore};
use quinasim::storage::{establish_connection, establish_in_memory};
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

async fn seed(store: &SqlStore, jobs: usize) -> Vec<i32> {
    let mut ids = Vec::new();
    for i in 0..jobs {
        let recipe = Recipe::new(format!("job-{i}"), RecipeParameters::default());
        let job = store
            .create(&recipe, ContestRange::new(1, 10).unwrap())
            .await
            .unwrap();
        ids.push(job.id);
    }
    ids
}

/// Runs `claimers` concurrent single claim attempts and returns the winners.
async fn race(store: Arc<SqlStore>, claimers: usize) -> Vec<(String, i32)> {
    let handles: Vec<_> = (0..claimers)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                let worker = format!("claimer-{n}");
                store
                    .claim_pending(&worker)
                    .await
                    .unwrap()
                    .map(|job| (worker, job.id))
            })
        })
        .collect();

    let mut winners = Vec::new();
    for h in handles {
        if let Some(w) = h.await.unwrap() {
            winners.push(w);
        }
    }
    winners
}

async fn check(db: DatabaseConnection, claimers: usize, jobs: usize) {
    let store = Arc::new(SqlStore::new(Arc::new(db)));
    seed(&store, jobs).await;

    let winners = race(store.clone(), claimers).await;
    assert_eq!(winners.len(), claimers.min(jobs));

    let distinct: HashSet<i32> = winners.iter().map(|(_, id)| *id).collect();
    assert_eq!(distinct.len(), winners.len(), "a job was claimed twice");

    for (worker, id) in &winners {
        let job = store.get(*id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.worker_id.as_deref(), Some(worker.as_str()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn more_claimers_than_jobs() {
    check(establish_in_memory().await.unwrap(), 8, 3).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn more_jobs_than_claimers() {
    check(establish_in_memory().await.unwrap(), 3, 8).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_queue_claims_nothing() {
    check(establish_in_memory().await.unwrap(), 5, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_database_with_pooled_connections() {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("quinasim-queue-{}-{}.db", std::process::id(), nanos));
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let db = establish_connection(&url).await.unwrap();
    check(db, 10, 6).await;

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
}
