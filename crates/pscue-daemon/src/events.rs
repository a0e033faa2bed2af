//! Daemon events.
//!
//! Events are the primary communication mechanism within the daemon.
//! Components emit events to notify others of state changes, and handle
//! events to react to changes elsewhere in the system.

use pscue_client::history::HistoryEntry;

/// Events that flow through the daemon's event bus.
///
/// Events are broadcast to all components. Each component decides which
/// events it cares about in its `handle_event` implementation.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    // ---- Learning ----
    /// The shell reported an executed command.
    ///
    /// The learning component feeds it to the knowledge graph, history ring,
    /// and transition learners; the completion component uses successful
    /// executions as positive cache feedback.
    CommandRecorded(HistoryEntry),

    // ---- Persistence ----
    /// Request an immediate save (periodic timer or external trigger).
    SaveRequested,

    /// A save completed successfully; baselines have advanced.
    SaveCompleted,

    /// A save failed. In-memory deltas are kept for the next attempt.
    SaveFailed {
        /// Error message describing what went wrong.
        error: String,
    },

    // ---- Caches ----
    /// Completion caches were cleared (debug request or external command).
    CacheCleared,

    /// Settings have changed, components should reload if needed.
    SettingsReloaded,

    // ---- Lifecycle ----
    /// Request graceful shutdown of the daemon.
    ShutdownRequested,
}
