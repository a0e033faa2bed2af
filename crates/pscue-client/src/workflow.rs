//! Workflow learner.
//!
//! Tracks time-weighted transitions between normalized commands ("after
//! `git add`, this user usually runs `git commit` about 30 seconds later")
//! and predicts the next step with a confidence score boosted when the
//! elapsed time matches the learned rhythm.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::settings::Settings;

/// Tools whose first non-flag argument is a verb worth keeping during
/// command normalization (`git commit -m x` -> `git commit`).
pub const MULTI_VERB_TOOLS: &[&str] = &[
    "git",
    "docker",
    "kubectl",
    "dotnet",
    "cargo",
    "npm",
    "pnpm",
    "yarn",
    "gh",
    "az",
    "scoop",
    "winget",
    "helm",
    "terraform",
];

/// Normalize a command line for workflow tracking: the base command,
/// lowercased, plus the first non-flag token for multi-verb tools.
pub fn normalize_command(command_line: &str) -> String {
    let mut tokens = command_line.split_whitespace();
    let Some(base) = tokens.next() else {
        return String::new();
    };
    let base = base.to_lowercase();

    if MULTI_VERB_TOOLS.contains(&base.as_str()) {
        if let Some(verb) = tokens.find(|token| !token.starts_with('-')) {
            return format!("{base} {}", verb.to_lowercase());
        }
    }

    base
}

#[derive(Clone, Copy, Debug)]
pub struct WorkflowTransition {
    pub frequency: u64,
    pub total_time_delta_ms: u64,
    pub first_seen: OffsetDateTime,
    pub last_seen: OffsetDateTime,
}

impl WorkflowTransition {
    pub fn avg_time_delta_ms(&self) -> u64 {
        if self.frequency == 0 {
            0
        } else {
            self.total_time_delta_ms / self.frequency
        }
    }
}

/// Transition usage accumulated since the last save.
#[derive(Clone, Debug)]
pub struct WorkflowDelta {
    pub from: String,
    pub to: String,
    pub frequency: u64,
    pub time_delta_ms: u64,
    pub first_seen: OffsetDateTime,
    pub last_seen: OffsetDateTime,
}

#[derive(Clone, Copy, Debug)]
pub struct WorkflowStats {
    pub sources: usize,
    pub transitions: usize,
}

/// Time-weighted workflow graph.
pub struct WorkflowLearner {
    /// from -> (to -> transition)
    transitions: DashMap<String, HashMap<String, WorkflowTransition>>,
    /// from -> (to -> (frequency delta, time delta ms))
    deltas: DashMap<String, HashMap<String, (u64, u64)>>,
    enabled: bool,
    min_frequency: u64,
    max_time_delta: Duration,
    min_confidence: f64,
    max_per_source: usize,
    decay_days: f64,
}

impl WorkflowLearner {
    pub fn new(settings: &Settings) -> Self {
        Self {
            transitions: DashMap::new(),
            deltas: DashMap::new(),
            enabled: settings.workflow_learning && !settings.disable_learning,
            min_frequency: settings.workflow_min_frequency,
            max_time_delta: Duration::from_secs(settings.workflow_max_time_delta * 60),
            min_confidence: settings.workflow_min_confidence,
            max_per_source: settings.workflow_max_per_source.max(1),
            decay_days: settings.decay_days,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a transition observed `elapsed` after the previous command.
    ///
    /// Slow transitions (above the configured maximum) and self-transitions
    /// are discarded.
    pub fn record_transition(&self, from_line: &str, to_line: &str, elapsed: Duration) {
        if !self.enabled || elapsed > self.max_time_delta {
            return;
        }

        let from = normalize_command(from_line);
        let to = normalize_command(to_line);
        if from.is_empty() || to.is_empty() || from == to {
            return;
        }

        let now = OffsetDateTime::now_utc();
        let elapsed_ms = elapsed.as_millis() as u64;

        {
            let mut entry = self.transitions.entry(from.clone()).or_default();
            let transition = entry.entry(to.clone()).or_insert(WorkflowTransition {
                frequency: 0,
                total_time_delta_ms: 0,
                first_seen: now,
                last_seen: now,
            });
            transition.frequency += 1;
            transition.total_time_delta_ms += elapsed_ms;
            transition.last_seen = now;

            if entry.len() > self.max_per_source {
                let excess = entry.len() - self.max_per_source;
                evict_weakest(&mut entry, excess);
            }
        }

        let mut delta = self.deltas.entry(from).or_default();
        let slot = delta.entry(to).or_insert((0, 0));
        slot.0 += 1;
        slot.1 += elapsed_ms;
    }

    /// Confidence that this transition fires next, before any time boost.
    pub fn confidence(&self, transition: &WorkflowTransition, now: OffsetDateTime) -> f64 {
        if transition.frequency < self.min_frequency {
            return 0.0;
        }
        let base = (transition.frequency as f64 / 20.0).min(1.0);
        let age_days = ((now - transition.last_seen).as_seconds_f64() / 86_400.0).max(0.0);
        let recency = (-age_days / self.decay_days).exp().min(1.0);
        0.7 * base + 0.3 * recency
    }

    /// Boost factor for how well the elapsed time matches the learned pace.
    pub fn time_boost(elapsed_ms: u64, avg_ms: u64) -> f64 {
        let avg = if avg_ms == 0 { 60_000 } else { avg_ms };
        let ratio = elapsed_ms as f64 / avg as f64;
        if ratio < 1.5 {
            1.5
        } else if ratio < 5.0 {
            1.2
        } else if ratio < 30.0 {
            1.0
        } else {
            0.8
        }
    }

    /// Predict follow-up commands for `last_command_line`, executed
    /// `elapsed` ago. Results are `(normalized command, confidence)` sorted
    /// by descending confidence, filtered by the configured minimum.
    pub fn predict(&self, last_command_line: &str, elapsed: Duration) -> Vec<(String, f64)> {
        if !self.enabled {
            return Vec::new();
        }

        let from = normalize_command(last_command_line);
        let Some(entry) = self.transitions.get(&from) else {
            return Vec::new();
        };

        let now = OffsetDateTime::now_utc();
        let elapsed_ms = elapsed.as_millis() as u64;

        let mut results: Vec<(String, f64)> = entry
            .iter()
            .filter_map(|(to, transition)| {
                let confidence = self.confidence(transition, now);
                if confidence <= 0.0 {
                    return None;
                }
                let boost = Self::time_boost(elapsed_ms, transition.avg_time_delta_ms());
                let score = (confidence * boost).min(1.0);
                (score >= self.min_confidence).then(|| (to.clone(), score))
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    pub fn stats(&self) -> WorkflowStats {
        WorkflowStats {
            sources: self.transitions.len(),
            transitions: self.transitions.iter().map(|entry| entry.len()).sum(),
        }
    }

    pub fn clear(&self) {
        self.transitions.clear();
        self.deltas.clear();
    }

    // ---- Persistence support ----

    pub fn snapshot_deltas(&self) -> Vec<WorkflowDelta> {
        let mut out = Vec::new();
        for entry in self.deltas.iter() {
            let from = entry.key();
            for (to, (freq, ms)) in entry.iter() {
                if *freq == 0 {
                    continue;
                }
                let (first_seen, last_seen) = self
                    .transitions
                    .get(from)
                    .and_then(|m| m.get(to).map(|t| (t.first_seen, t.last_seen)))
                    .unwrap_or_else(|| {
                        let now = OffsetDateTime::now_utc();
                        (now, now)
                    });
                out.push(WorkflowDelta {
                    from: from.clone(),
                    to: to.clone(),
                    frequency: *freq,
                    time_delta_ms: *ms,
                    first_seen,
                    last_seen,
                });
            }
        }
        out
    }

    pub fn clear_deltas(&self) {
        self.deltas.clear();
    }

    /// Install persisted state without generating a delta.
    pub fn initialize_transition(
        &self,
        from: &str,
        to: &str,
        frequency: u64,
        total_time_delta_ms: u64,
        first_seen: OffsetDateTime,
        last_seen: OffsetDateTime,
    ) {
        let mut entry = self.transitions.entry(from.to_lowercase()).or_default();
        entry.insert(
            to.to_lowercase(),
            WorkflowTransition {
                frequency,
                total_time_delta_ms,
                first_seen,
                last_seen,
            },
        );
    }
}

fn evict_weakest(transitions: &mut HashMap<String, WorkflowTransition>, excess: usize) {
    for _ in 0..excess {
        let weakest = transitions
            .iter()
            .min_by_key(|(_, t)| (t.frequency, t.last_seen))
            .map(|(key, _)| key.clone());
        match weakest {
            Some(key) => {
                transitions.remove(&key);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn learner() -> WorkflowLearner {
        let settings: Settings = Settings::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        WorkflowLearner::new(&settings)
    }

    #[test]
    fn normalizes_multi_verb_tools() {
        assert_eq!(normalize_command("git commit -m x"), "git commit");
        assert_eq!(normalize_command("git -C repo status"), "git status");
        assert_eq!(normalize_command("ls -la"), "ls");
        assert_eq!(normalize_command("Docker run alpine"), "docker run");
        assert_eq!(normalize_command(""), "");
    }

    #[test]
    fn rejects_self_transitions_and_slow_pairs() {
        let wl = learner();
        wl.record_transition("git status", "git status -v", Duration::from_secs(5));
        wl.record_transition("ls", "pwd", Duration::from_secs(60 * 60));

        let stats = wl.stats();
        assert_eq!(stats.transitions, 0);
    }

    #[test]
    fn average_delay_holds() {
        let wl = learner();
        wl.record_transition("git add .", "git commit -m x", Duration::from_secs(20));
        wl.record_transition("git add .", "git commit -m y", Duration::from_secs(40));

        let deltas = wl.snapshot_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].frequency, 2);
        assert_eq!(deltas[0].time_delta_ms, 60_000);
    }

    #[test]
    fn workflow_prediction_after_repeated_pair() {
        let wl = learner();
        for _ in 0..8 {
            wl.record_transition("git add .", "git commit -m x", Duration::from_secs(30));
        }

        let predictions = wl.predict("git add .", Duration::from_secs(20));
        let commit = predictions
            .iter()
            .find(|(to, _)| to == "git commit")
            .expect("git commit predicted");
        assert!(commit.1 >= 0.6);
    }

    #[test]
    fn time_boost_tiers() {
        assert_eq!(WorkflowLearner::time_boost(20_000, 30_000), 1.5);
        assert_eq!(WorkflowLearner::time_boost(60_000, 30_000), 1.2);
        assert_eq!(WorkflowLearner::time_boost(300_000, 30_000), 1.0);
        assert_eq!(WorkflowLearner::time_boost(1_000_000, 30_000), 0.8);
        // zero average falls back to one minute
        assert_eq!(WorkflowLearner::time_boost(30_000, 0), 1.5);
    }

    #[test]
    fn per_source_cap_drops_weakest() {
        let settings: Settings = Settings::builder()
            .unwrap()
            .set_override("workflow_max_per_source", 2)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let wl = WorkflowLearner::new(&settings);

        for _ in 0..3 {
            wl.record_transition("make", "make test", Duration::from_secs(5));
        }
        for _ in 0..2 {
            wl.record_transition("make", "ls", Duration::from_secs(5));
        }
        wl.record_transition("make", "pwd", Duration::from_secs(5));

        let stats = wl.stats();
        assert_eq!(stats.transitions, 2);
        let predictions = wl.predict("make", Duration::from_secs(5));
        assert!(predictions.iter().all(|(to, _)| to != "pwd"));
    }
}
