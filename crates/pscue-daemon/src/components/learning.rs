//! Learning component.
//!
//! Feeds executed commands into the in-memory learners: the knowledge
//! graph, the history ring, and the sequence/workflow transition tables.

use std::path::Path;

use eyre::Result;

use crate::{
    daemon::{Component, DaemonHandle},
    events::DaemonEvent,
};

/// Learning component - routes `CommandRecorded` events to the stores.
pub struct LearningComponent {
    handle: Option<DaemonHandle>,
}

impl LearningComponent {
    pub fn new() -> Self {
        Self { handle: None }
    }
}

impl Default for LearningComponent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Component for LearningComponent {
    fn name(&self) -> &'static str {
        "learning"
    }

    async fn start(&mut self, handle: DaemonHandle) -> Result<()> {
        self.handle = Some(handle);
        tracing::info!("learning component started");
        Ok(())
    }

    async fn handle_event(&mut self, event: &DaemonEvent) -> Result<()> {
        if let DaemonEvent::CommandRecorded(entry) = event {
            if let Some(handle) = &self.handle {
                handle.stores().record_command(
                    &entry.command,
                    &entry.command_line,
                    &entry.arguments,
                    entry.success,
                    entry.working_directory.as_deref().map(Path::new),
                    entry.timestamp,
                );
                tracing::debug!(command = %entry.command, "recorded command");
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        tracing::info!("learning component stopped");
        Ok(())
    }
}
