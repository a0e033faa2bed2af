//! Persistence component.
//!
//! Periodically saves accumulated deltas to the learned-data database and
//! performs a final save on shutdown. Save failures are logged and retried
//! on the next tick; baselines only advance after a confirmed success, so a
//! failed save never loses usage data.

use std::time::Duration;

use eyre::Result;

use crate::{
    daemon::{Component, DaemonHandle},
    events::DaemonEvent,
};

/// Persistence component - owns the auto-save timer.
pub struct PersistComponent {
    handle: Option<DaemonHandle>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl PersistComponent {
    pub fn new() -> Self {
        Self {
            handle: None,
            timer: None,
        }
    }

    async fn save(&self) {
        let Some(handle) = &self.handle else {
            return;
        };

        match handle.database().save_and_advance(handle.stores()).await {
            Ok(()) => {
                tracing::debug!("auto-save complete");
                handle.emit(DaemonEvent::SaveCompleted);
            }
            Err(err) => {
                // deltas stay in memory; the next tick retries
                tracing::warn!("auto-save failed: {err}");
                handle.emit(DaemonEvent::SaveFailed {
                    error: err.to_string(),
                });
            }
        }
    }
}

impl Default for PersistComponent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Component for PersistComponent {
    fn name(&self) -> &'static str {
        "persist"
    }

    async fn start(&mut self, handle: DaemonHandle) -> Result<()> {
        let interval_secs = handle.settings().await.save_interval_seconds.max(1);
        self.handle = Some(handle.clone());

        // The timer only emits events; the save itself runs on the event
        // loop, which serializes it against other handlers.
        self.timer = Some(tokio::spawn(async move {
            let period = Duration::from_secs(interval_secs);
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                handle.emit(DaemonEvent::SaveRequested);
            }
        }));

        tracing::info!(interval_secs, "persist component started");
        Ok(())
    }

    async fn handle_event(&mut self, event: &DaemonEvent) -> Result<()> {
        if matches!(event, DaemonEvent::SaveRequested) {
            self.save().await;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        // final save on shutdown
        self.save().await;
        tracing::info!("persist component stopped");
        Ok(())
    }
}
