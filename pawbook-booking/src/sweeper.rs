use pawbook_core::CoreResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::manager::{ReservationManager, SettleOutcome};
use crate::metrics;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u64,
    /// Picked up but already settled by someone else before we got to it.
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Clone)]
struct SweepJob {
    manager: Arc<ReservationManager>,
    batch_size: usize,
}

impl SweepJob {
    async fn run_once(&self) -> CoreResult<SweepReport> {
        let now = self.manager.now();
        let due = self.manager.store().list_expired(now, self.batch_size).await?;
        let mut report = SweepReport::default();

        for id in due {
            match self.manager.expire(id).await {
                Ok(SettleOutcome::Applied) => report.expired += 1,
                Ok(outcome) => {
                    debug!(reservation_id = %id, ?outcome, "hold no longer expirable");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(reservation_id = %id, error = %e, "failed to expire hold, continuing sweep");
                    report.failed += 1;
                }
            }
        }

        metrics::record_sweep(report.expired, report.skipped, report.failed);
        if report.expired > 0 || report.failed > 0 {
            info!(expired = report.expired, skipped = report.skipped, failed = report.failed, "expiry sweep finished");
        } else {
            debug!("expiry sweep found nothing to expire");
        }
        Ok(report)
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background task that reclaims capacity from abandoned holds.
///
/// Owns its task: `start` and `stop` are idempotent and [`ExpirySweeper::tick`]
/// runs a single sweep on demand.
pub struct ExpirySweeper {
    job: SweepJob,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<ReservationManager>) -> Self {
        Self {
            job: SweepJob {
                manager,
                batch_size: DEFAULT_BATCH_SIZE,
            },
            interval: DEFAULT_INTERVAL,
            running: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.job.batch_size = batch_size.max(1);
        self
    }

    /// One sweep. Individual failures are counted, not returned; only a failed
    /// scan for due holds is an error.
    pub async fn tick(&self) -> CoreResult<SweepReport> {
        self.job.run_once().await
    }

    /// Spawn the periodic loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return false;
            }
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let job = self.job.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = job.run_once().await {
                            error!(error = %e, "expiry sweep could not list due holds");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("expiry sweeper stopped");
        });

        info!(interval_secs = period.as_secs_f64(), batch_size = self.job.batch_size, "expiry sweeper started");
        *running = Some(Running { shutdown, handle });
        true
    }

    /// Stop the loop and wait for an in-flight sweep to finish. Returns `false`
    /// if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };
        let _ = current.shutdown.send(true);
        if let Err(e) = current.handle.await {
            error!(error = %e, "expiry sweeper task ended abnormally");
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
    }
}
