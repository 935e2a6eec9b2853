//! Turns connectivity changes and foreground events into queue flushes.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};

use super::mood_pipeline::MoodPipeline;
use crate::remote::RemoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    ConnectivityRestored,
    Foreground,
    Manual,
}

/// Cloneable handle used to report connectivity and app lifecycle events.
#[derive(Clone)]
pub struct ConnectivityHandle {
    online: Arc<watch::Sender<bool>>,
    triggers: mpsc::UnboundedSender<FlushTrigger>,
    shutdown: Arc<Notify>,
}

impl ConnectivityHandle {
    /// Report the current connectivity. Going from offline to online
    /// schedules a flush.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.send_replace(online);
        if online && !was_online {
            tracing::info!("connectivity restored");
            self.trigger(FlushTrigger::ConnectivityRestored);
        } else if !online && was_online {
            tracing::info!("connectivity lost");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// The app came to the foreground.
    pub fn foreground(&self) {
        self.trigger(FlushTrigger::Foreground);
    }

    pub fn flush_now(&self) {
        self.trigger(FlushTrigger::Manual);
    }

    /// Stop the monitor, abandoning any drain in progress.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    fn trigger(&self, trigger: FlushTrigger) {
        if self.triggers.send(trigger).is_err() {
            tracing::debug!(?trigger, "connectivity monitor not running");
        }
    }
}

pub struct ConnectivityMonitor {
    online: watch::Receiver<bool>,
    triggers: mpsc::UnboundedReceiver<FlushTrigger>,
    shutdown: Arc<Notify>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> (ConnectivityHandle, Self) {
        let (online_tx, online_rx) = watch::channel(initially_online);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());

        let handle = ConnectivityHandle {
            online: Arc::new(online_tx),
            triggers: trigger_tx,
            shutdown: shutdown.clone(),
        };
        let monitor = Self {
            online: online_rx,
            triggers: trigger_rx,
            shutdown,
        };
        (handle, monitor)
    }

    /// Drain the pipeline's queue each time a trigger arrives while online.
    ///
    /// Runs until [`ConnectivityHandle::shutdown`] is called or every handle
    /// has been dropped.
    pub async fn run<R: RemoteStore>(mut self, pipeline: &MoodPipeline<R>) {
        loop {
            let trigger = tokio::select! {
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
                _ = self.shutdown.notified() => break,
            };

            // Triggers that piled up are served by the same drain
            while self.triggers.try_recv().is_ok() {}

            if !*self.online.borrow() {
                tracing::debug!(?trigger, "offline, flush deferred");
                continue;
            }

            tokio::select! {
                result = pipeline.drain_while(&self.online) => match result {
                    Ok(report) if report.skipped => {
                        tracing::debug!(?trigger, "flush already running");
                    }
                    Ok(report) => {
                        tracing::info!(
                            ?trigger,
                            synced = report.synced.len(),
                            failed = report.failures.len(),
                            remaining = report.remaining,
                            "queue flushed"
                        );
                    }
                    Err(e) => tracing::warn!(?trigger, error = %e, "queue flush failed"),
                },
                _ = self.shutdown.notified() => break,
            }
        }

        tracing::debug!("connectivity monitor stopped");
    }
}
