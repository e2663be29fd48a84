//! Periodic pool tasks

use crate::pool::{BlockPool, SyncOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the running distribution and assembly tasks
pub struct SyncService {
    pool: Arc<BlockPool>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncService {
    /// Spawn both tasks on the current tokio runtime
    pub fn start(pool: Arc<BlockPool>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let distribute = pool.config().distribute_interval();
        let sync = pool.config().sync_interval();

        let tasks = vec![
            tokio::spawn(distribute_loop(pool.clone(), distribute, rx.clone())),
            tokio::spawn(sync_loop(pool.clone(), sync, rx)),
        ];
        tracing::info!(?distribute, ?sync, "block pool started");
        Self {
            pool,
            shutdown,
            tasks,
        }
    }

    /// The pool the tasks drive
    pub fn pool(&self) -> &Arc<BlockPool> {
        &self.pool
    }

    /// Signal both tasks and wait for them to finish their current tick
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "block pool task failed");
            }
        }
        tracing::info!("block pool stopped");
    }
}

async fn distribute_loop(pool: Arc<BlockPool>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                pool.distribute_hashes(Instant::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn sync_loop(pool: Arc<BlockPool>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Chain validation is CPU and disk bound
                let worker = pool.clone();
                match tokio::task::spawn_blocking(move || worker.sync_once()).await {
                    Ok(SyncOutcome::Idle) | Ok(SyncOutcome::TooLight) => {}
                    Ok(outcome) => tracing::debug!(?outcome, "sync pass"),
                    Err(err) => tracing::error!(error = %err, "sync pass panicked"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
