//! Bounded command history.
//!
//! A thread-safe FIFO ring of the most recent executed commands. The ring
//! feeds recent-use boosts in the predictor and is persisted replace-style:
//! the stored rows are always the newest N entries.

use std::collections::VecDeque;
use std::sync::Mutex;

use time::OffsetDateTime;
use typed_builder::TypedBuilder;

/// One executed command.
#[derive(Clone, Debug, TypedBuilder)]
pub struct HistoryEntry {
    #[builder(setter(into))]
    pub command: String,
    #[builder(setter(into))]
    pub command_line: String,
    #[builder(default)]
    pub arguments: Vec<String>,
    #[builder(default = OffsetDateTime::now_utc())]
    pub timestamp: OffsetDateTime,
    #[builder(default = true)]
    pub success: bool,
    #[builder(default, setter(into))]
    pub working_directory: Option<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct HistoryStats {
    pub len: usize,
    pub capacity: usize,
    pub successes: usize,
    pub failures: usize,
}

/// FIFO ring buffer of [`HistoryEntry`], oldest evicted on overflow.
pub struct CommandHistory {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Record a command executed right now.
    pub fn add(
        &self,
        command: &str,
        command_line: &str,
        arguments: &[String],
        success: bool,
        working_directory: Option<String>,
    ) {
        self.add_entry(
            HistoryEntry::builder()
                .command(command)
                .command_line(command_line)
                .arguments(arguments.to_vec())
                .success(success)
                .working_directory(working_directory)
                .build(),
        );
    }

    /// Record an entry with an explicit timestamp.
    pub fn add_entry(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The newest `n` entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().expect("history lock poisoned");
        entries.iter().rev().take(n).cloned().collect()
    }

    /// The newest `n` entries for one command, most recent first.
    pub fn for_command(&self, command: &str, n: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().expect("history lock poisoned");
        entries
            .iter()
            .rev()
            .filter(|entry| entry.command.eq_ignore_ascii_case(command))
            .take(n)
            .cloned()
            .collect()
    }

    pub fn most_recent(&self) -> Option<HistoryEntry> {
        let entries = self.entries.lock().expect("history lock poisoned");
        entries.back().cloned()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().expect("history lock poisoned").len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> HistoryStats {
        let entries = self.entries.lock().expect("history lock poisoned");
        let successes = entries.iter().filter(|entry| entry.success).count();
        HistoryStats {
            len: entries.len(),
            capacity: self.capacity,
            successes,
            failures: entries.len() - successes,
        }
    }

    pub fn clear(&self) {
        self.entries.lock().expect("history lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ring_evicts_oldest() {
        let history = CommandHistory::new(3);
        for name in ["a", "b", "c", "d"] {
            history.add(name, name, &[], true, None);
        }

        assert_eq!(history.count(), 3);
        let recent = history.recent(10);
        let names: Vec<&str> = recent.iter().map(|e| e.command.as_str()).collect();
        assert_eq!(names, vec!["d", "c", "b"]);
    }

    #[test]
    fn for_command_filters_case_insensitively() {
        let history = CommandHistory::new(10);
        history.add("git", "git status", &[], true, None);
        history.add("cargo", "cargo build", &[], true, None);
        history.add("Git", "git push", &[], false, None);

        let git = history.for_command("GIT", 10);
        assert_eq!(git.len(), 2);
        assert_eq!(git[0].command_line, "git push");
    }

    #[test]
    fn stats_count_outcomes() {
        let history = CommandHistory::new(10);
        history.add("a", "a", &[], true, None);
        history.add("b", "b", &[], false, None);

        let stats = history.stats();
        assert_eq!(stats.len, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(history.most_recent().unwrap().command, "b");

        history.clear();
        assert_eq!(history.count(), 0);
    }
}
