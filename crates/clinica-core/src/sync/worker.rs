use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::ClinicStore;

/// Buffer size for the signal channel
const SIGNAL_BUFFER_SIZE: usize = 16;

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    /// The network came back: mark online and sync right away
    Online,
    Offline,
    /// Probe and sync without waiting for the next tick
    SyncNow,
    Shutdown,
}

/// Handle to a running worker.
pub struct SyncHandle {
    signals: mpsc::Sender<ConnectivitySignal>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Deliver a signal. Returns false once the worker has stopped.
    pub async fn signal(&self, signal: ConnectivitySignal) -> bool {
        self.signals.send(signal).await.is_ok()
    }

    /// A sender for other tasks (e.g. a Ctrl-C handler).
    pub fn sender(&self) -> mpsc::Sender<ConnectivitySignal> {
        self.signals.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the worker and wait for it. A cycle in progress finishes first.
    pub async fn shutdown(self) {
        // Already stopped if the channel is closed
        let _ = self.signals.send(ConnectivitySignal::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync worker ended abnormally");
        }
    }
}

pub struct SyncWorker {
    store: ClinicStore,
    interval: Duration,
    signals: mpsc::Receiver<ConnectivitySignal>,
}

impl SyncWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(store: ClinicStore, interval: Duration) -> SyncHandle {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER_SIZE);
        let worker = SyncWorker {
            store,
            interval: interval.max(MIN_INTERVAL),
            signals: rx,
        };
        let task = tokio::spawn(worker.run());
        SyncHandle { signals: tx, task }
    }

    async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Sync worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; start-up already loaded
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                signal = self.signals.recv() => match signal {
                    Some(ConnectivitySignal::Online) => {
                        self.store.set_online(true);
                        self.sync().await;
                    }
                    Some(ConnectivitySignal::Offline) => {
                        self.store.set_online(false);
                    }
                    Some(ConnectivitySignal::SyncNow) => {
                        if self.store.check_connectivity().await {
                            self.sync().await;
                        }
                    }
                    Some(ConnectivitySignal::Shutdown) | None => break,
                },
            }
        }

        info!(pending = self.store.pending_count(), "Sync worker stopped");
    }

    async fn on_tick(&self) {
        let online = self.store.check_connectivity().await;
        if online && self.store.pending_count() > 0 {
            self.sync().await;
        } else if !online {
            debug!(pending = self.store.pending_count(), "Offline, sync postponed");
        }
    }

    async fn sync(&self) {
        let report = self.store.sync_pending().await;
        if !report.ran {
            debug!("Sync cycle skipped");
        }
    }
}
