use crate::backtest::executor::JobExecutor;
use crate::backtest::model::SimulationSummary;
use crate::backtest::store::JobStore;
use crate::config::Settings;
use crate::error::SimError;
use crate::storage::now_ms;
use futures::future::join_all;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Running jobs older than this are handed back to the queue at start.
    pub lease_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            lease_timeout: None,
        }
    }
}

impl From<&Settings> for PoolConfig {
    fn from(s: &Settings) -> Self {
        Self {
            concurrency: s.worker_concurrency,
            poll_interval: s.poll_interval,
            lease_timeout: s.lease_timeout,
        }
    }
}

/// Terminal notifications published by workers.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Completed {
        job_id: i32,
        worker_id: String,
        summary: SimulationSummary,
    },
    Failed {
        job_id: i32,
        worker_id: String,
        message: String,
    },
    Cancelled {
        job_id: i32,
        worker_id: String,
    },
}

pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    config: PoolConfig,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn JobStore>, executor: Arc<JobExecutor>, config: PoolConfig) -> Self {
        Self {
            store,
            executor,
            config,
            events: None,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Reclaims expired leases, then spawns `concurrency` worker loops.
    pub async fn start(&mut self) {
        if self.is_running() {
            warn!("worker pool already started");
            return;
        }

        if let Some(lease) = self.config.lease_timeout {
            let cutoff = now_ms() - lease.as_millis() as i64;
            match self.store.reclaim_expired(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!("requeued {} expired running jobs", n),
                Err(e) => error!("lease reclaim failed: {}", e),
            }
        }

        let concurrency = self.config.concurrency.max(1);
        let pid = std::process::id();
        for idx in 0..concurrency {
            let worker_id = format!("{}-w{}", pid, idx + 1);
            let handle = tokio::spawn(worker_loop(
                worker_id,
                self.store.clone(),
                self.executor.clone(),
                self.config.poll_interval,
                self.events.clone(),
                self.shutdown.clone(),
            ));
            self.handles.push(handle);
        }
        info!(
            "worker pool started concurrency={} poll_interval_ms={}",
            concurrency,
            self.config.poll_interval.as_millis()
        );
    }

    /// Stops claiming, aborts in-flight runs and waits for every worker to exit.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut self.handles);
        for res in join_all(handles).await {
            if let Err(e) = res {
                error!("worker task ended abnormally: {}", e);
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: String,
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    poll_interval: Duration,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let job = match store.claim_pending(&worker_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!("claim failed worker={} error={}", worker_id, e);
                None
            }
        };

        let Some(job) = job else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(poll_interval) => continue,
            }
        };

        let job_id = job.id;
        // shutdown aborts the run at its next contest; the job stays running
        let event = match executor.execute(job, &worker_id, &shutdown).await {
            Ok(summary) => Some(JobEvent::Completed {
                job_id,
                worker_id: worker_id.clone(),
                summary,
            }),
            Err(SimError::Cancelled) => Some(JobEvent::Cancelled {
                job_id,
                worker_id: worker_id.clone(),
            }),
            Err(SimError::Persistence(_)) | Err(SimError::InvalidState(_)) => None,
            Err(e) => Some(JobEvent::Failed {
                job_id,
                worker_id: worker_id.clone(),
                message: e.to_string(),
            }),
        };

        if let (Some(tx), Some(event)) = (&events, event) {
            let _ = tx.send(event);
        }
    }
    info!("worker stopped worker={}", worker_id);
}
