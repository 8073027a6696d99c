//! Background trigger for scheduled syncs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::SyncConfig;

use super::orchestrator::SyncOrchestrator;
use super::types::ScheduledRun;

/// Shortest pause between two ticks.
const MIN_DELAY: Duration = Duration::from_secs(1);

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    config: SyncConfig,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: SyncConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            orchestrator,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start ticking. The first tick runs immediately.
    pub fn start(&self) {
        if !self.config.scheduler_enabled {
            info!("Scheduled syncs disabled in configuration");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sync scheduler already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let orchestrator = Arc::clone(&self.orchestrator);
        let recheck = Duration::from_secs(self.config.disabled_recheck_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Sync scheduler started");
            loop {
                let delay = match orchestrator.run_scheduled(Utc::now()).await {
                    Ok(ScheduledRun::Disabled) | Ok(ScheduledRun::Interrupted { .. }) => recheck,
                    Ok(ScheduledRun::Skipped { next_due }) | Ok(ScheduledRun::Completed { next_due, .. }) => {
                        delay_until(next_due)
                    }
                    Err(e) => {
                        error!(error = %e, "Scheduled sync failed");
                        recheck
                    }
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sync scheduler received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
            info!("Sync scheduler stopped");
        });
    }

    /// Stop ticking and interrupt a sync in progress after its current work.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Sync scheduler not running");
            return;
        }
        info!("Stopping sync scheduler");
        self.orchestrator.shutdown();
        let _ = self.shutdown_tx.send(());
    }
}

fn delay_until(due: DateTime<Utc>) -> Duration {
    (due - Utc::now()).to_std().unwrap_or(MIN_DELAY).max(MIN_DELAY)
}
