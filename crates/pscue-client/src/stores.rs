//! Shared learning state.
//!
//! One [`LearningStores`] instance is created per process and handed to the
//! predictor, the persistence layer, and the daemon. It owns the knowledge
//! graph, the history ring, and both transition learners, and implements the
//! shell-side `record_command` contract that feeds all of them.

use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::history::{CommandHistory, HistoryEntry, HistoryStats};
use crate::knowledge::{KnowledgeGraph, KnowledgeStats};
use crate::sequence::{SequencePredictor, SequenceStats};
use crate::settings::Settings;
use crate::workflow::{self, WorkflowLearner, WorkflowStats};

#[derive(Clone, Copy, Debug)]
pub struct EngineStats {
    pub knowledge: KnowledgeStats,
    pub history: HistoryStats,
    pub sequences: SequenceStats,
    pub workflows: WorkflowStats,
}

/// Handle to all in-memory learning state. Cheap to clone.
#[derive(Clone)]
pub struct LearningStores {
    pub knowledge: Arc<KnowledgeGraph>,
    pub history: Arc<CommandHistory>,
    pub sequences: Arc<SequencePredictor>,
    pub workflows: Arc<WorkflowLearner>,
    learning_disabled: bool,
}

impl LearningStores {
    pub fn new(settings: &Settings) -> Self {
        Self {
            knowledge: Arc::new(KnowledgeGraph::new(settings)),
            history: Arc::new(CommandHistory::new(settings.history_size)),
            sequences: Arc::new(SequencePredictor::new(settings)),
            workflows: Arc::new(WorkflowLearner::new(settings)),
            learning_disabled: settings.disable_learning,
        }
    }

    /// Record an executed command: updates the knowledge graph, history
    /// ring, and both transition learners (using the elapsed time since the
    /// previous entry).
    pub fn record_command(
        &self,
        command: &str,
        command_line: &str,
        arguments: &[String],
        success: bool,
        working_directory: Option<&Path>,
        timestamp: OffsetDateTime,
    ) {
        if self.learning_disabled || command.is_empty() {
            return;
        }

        let previous = self.history.most_recent();

        self.knowledge
            .record_usage(command, arguments, working_directory);

        if let Some(previous) = previous {
            let elapsed = (timestamp - previous.timestamp)
                .try_into()
                .unwrap_or(std::time::Duration::ZERO);
            let prev_norm = workflow::normalize_command(&previous.command_line);
            let this_norm = workflow::normalize_command(command_line);
            self.sequences
                .record_transition(&prev_norm, &this_norm, timestamp);
            self.workflows
                .record_transition(&previous.command_line, command_line, elapsed);
        }

        self.history.add_entry(
            HistoryEntry::builder()
                .command(command)
                .command_line(command_line)
                .arguments(arguments.to_vec())
                .timestamp(timestamp)
                .success(success)
                .working_directory(
                    working_directory.map(|p| p.to_string_lossy().into_owned()),
                )
                .build(),
        );
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            knowledge: self.knowledge.stats(),
            history: self.history.stats(),
            sequences: self.sequences.stats(),
            workflows: self.workflows.stats(),
        }
    }

    pub fn clear(&self) {
        self.knowledge.clear();
        self.history.clear();
        self.sequences.clear();
        self.workflows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn stores() -> LearningStores {
        let settings: Settings = Settings::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        LearningStores::new(&settings)
    }

    #[test]
    fn record_feeds_all_learners() {
        let stores = stores();
        let start = OffsetDateTime::now_utc() - Duration::seconds(30);

        stores.record_command(
            "git",
            "git add .",
            &["add".into(), ".".into()],
            true,
            None,
            start,
        );
        stores.record_command(
            "git",
            "git commit -m x",
            &["commit".into(), "-m".into(), "x".into()],
            true,
            None,
            start + Duration::seconds(20),
        );

        assert_eq!(stores.history.count(), 2);
        assert!(stores.knowledge.contains("git"));
        assert_eq!(stores.workflows.stats().transitions, 1);
        assert_eq!(stores.sequences.stats().transitions, 1);
    }

    #[test]
    fn disabled_learning_records_nothing() {
        let settings: Settings = Settings::builder()
            .unwrap()
            .set_override("disable_learning", true)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let stores = LearningStores::new(&settings);

        stores.record_command("git", "git status", &[], true, None, OffsetDateTime::now_utc());
        assert_eq!(stores.history.count(), 0);
        assert!(!stores.knowledge.contains("git"));
    }
}
