//! Usage knowledge graph.
//!
//! A concurrent map of commands to everything the engine has learned about
//! them: argument usage, argument co-occurrence, and flag combinations, each
//! with frecency bookkeeping. The graph also tracks a persistence baseline
//! per command so concurrent processes can merge their usage additively.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::dirnav;
use crate::settings::Settings;

/// Commands whose arguments are directory paths and get normalized to
/// absolute form before learning.
pub const NAVIGATION_COMMANDS: &[&str] = &["cd", "set-location", "sl", "chdir"];

pub fn is_navigation_command(command: &str) -> bool {
    NAVIGATION_COMMANDS
        .iter()
        .any(|nav| nav.eq_ignore_ascii_case(command))
}

/// Frecency: frequency share blended with exponential recency decay.
///
/// Clamped to `[0, 1]`; zero usage scores zero.
pub fn frecency_score(
    usage_count: u64,
    total_usage: u64,
    last_used: OffsetDateTime,
    now: OffsetDateTime,
    decay_days: f64,
) -> f64 {
    if usage_count == 0 || total_usage == 0 {
        return 0.0;
    }

    let freq = usage_count as f64 / total_usage as f64;
    let age_days = ((now - last_used).as_seconds_f64() / 86_400.0).max(0.0);
    let recency = (-age_days / decay_days).exp().min(1.0);

    (0.6 * freq + 0.4 * recency).clamp(0.0, 1.0)
}

/// Everything known about one argument of one command.
#[derive(Clone, Debug)]
pub struct ArgumentKnowledge {
    /// Original casing, as first observed.
    pub text: String,
    pub usage_count: u64,
    pub first_seen: OffsetDateTime,
    pub last_used: OffsetDateTime,
    pub is_flag: bool,
    /// Lowercased co-argument -> times seen in the same invocation.
    pub co_occurrences: HashMap<String, u64>,
}

impl ArgumentKnowledge {
    fn new(text: &str, now: OffsetDateTime) -> Self {
        Self {
            text: text.to_string(),
            usage_count: 0,
            first_seen: now,
            last_used: now,
            is_flag: text.starts_with('-'),
            co_occurrences: HashMap::new(),
        }
    }
}

/// Everything known about one command.
#[derive(Clone, Debug)]
pub struct CommandKnowledge {
    /// Original casing, as first observed.
    pub name: String,
    pub total_usage: u64,
    pub first_seen: OffsetDateTime,
    pub last_used: OffsetDateTime,
    /// Lowercased argument text -> knowledge.
    pub arguments: HashMap<String, ArgumentKnowledge>,
    /// Space-joined flag run (input order) -> count.
    pub flag_combinations: HashMap<String, u64>,
}

impl CommandKnowledge {
    fn new(name: &str, now: OffsetDateTime) -> Self {
        Self {
            name: name.to_string(),
            total_usage: 0,
            first_seen: now,
            last_used: now,
            arguments: HashMap::new(),
            flag_combinations: HashMap::new(),
        }
    }
}

/// Snapshot of persisted counts, used to compute additive deltas.
#[derive(Clone, Debug, Default)]
struct CommandBaseline {
    total_usage: u64,
    arguments: HashMap<String, u64>,
    co_occurrences: HashMap<String, HashMap<String, u64>>,
    flag_combinations: HashMap<String, u64>,
}

/// A ranked argument suggestion produced by [`KnowledgeGraph::suggestions`].
#[derive(Clone, Debug)]
pub struct ArgumentSuggestion {
    pub text: String,
    pub usage_count: u64,
    pub last_used: OffsetDateTime,
    pub is_flag: bool,
    pub score: f64,
    /// The argument most often seen together with this one, if any.
    pub top_co_occurrence: Option<String>,
}

/// Usage accumulated since the last successful save, per command.
#[derive(Clone, Debug)]
pub struct CommandDelta {
    pub name: String,
    pub total_delta: u64,
    pub first_seen: OffsetDateTime,
    pub last_used: OffsetDateTime,
    pub arguments: Vec<ArgumentDelta>,
    /// `(argument, co_occurred_with, delta)`
    pub co_occurrences: Vec<(String, String, u64)>,
    /// `(flags, delta)`
    pub flag_combinations: Vec<(String, u64)>,
}

#[derive(Clone, Debug)]
pub struct ArgumentDelta {
    pub text: String,
    pub usage_delta: u64,
    pub first_seen: OffsetDateTime,
    pub last_used: OffsetDateTime,
    pub is_flag: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct KnowledgeStats {
    pub commands: usize,
    pub arguments: usize,
    pub max_commands: usize,
    pub max_args_per_command: usize,
}

/// Concurrent command/argument knowledge graph with LRU caps.
pub struct KnowledgeGraph {
    commands: DashMap<String, CommandKnowledge>,
    baselines: DashMap<String, CommandBaseline>,
    max_commands: usize,
    max_args_per_command: usize,
    decay_days: f64,
}

impl KnowledgeGraph {
    pub fn new(settings: &Settings) -> Self {
        Self {
            commands: DashMap::new(),
            baselines: DashMap::new(),
            max_commands: settings.max_commands,
            max_args_per_command: settings.max_args_per_cmd,
            decay_days: settings.decay_days,
        }
    }

    pub fn decay_days(&self) -> f64 {
        self.decay_days
    }

    /// Record one execution of `command` with its arguments.
    ///
    /// Navigation-command arguments are normalized to absolute paths first;
    /// arguments that fail to normalize are learned as typed.
    pub fn record_usage(&self, command: &str, args: &[String], cwd: Option<&Path>) {
        if command.is_empty() {
            return;
        }

        let now = OffsetDateTime::now_utc();
        let normalized: Vec<String> = if is_navigation_command(command) {
            args.iter()
                .map(|arg| dirnav::normalize_path(arg, cwd).unwrap_or_else(|| arg.clone()))
                .collect()
        } else {
            args.to_vec()
        };

        let key = command.to_lowercase();
        {
            let mut entry = self
                .commands
                .entry(key)
                .or_insert_with(|| CommandKnowledge::new(command, now));
            entry.total_usage += 1;
            entry.last_used = now;

            let arg_keys: Vec<String> = normalized
                .iter()
                .filter(|arg| !arg.is_empty())
                .map(|arg| arg.to_lowercase())
                .collect();

            for arg in normalized.iter().filter(|arg| !arg.is_empty()) {
                let arg_key = arg.to_lowercase();
                let knowledge = entry
                    .arguments
                    .entry(arg_key)
                    .or_insert_with(|| ArgumentKnowledge::new(arg, now));
                knowledge.usage_count += 1;
                knowledge.last_used = now;
            }

            // Co-occurrence over distinct argument keys; an argument never
            // co-occurs with itself within one invocation.
            let mut distinct: Vec<String> = Vec::new();
            for key in &arg_keys {
                if !distinct.contains(key) {
                    distinct.push(key.clone());
                }
            }
            for arg_key in &distinct {
                if let Some(knowledge) = entry.arguments.get_mut(arg_key) {
                    for other in &distinct {
                        if other != arg_key {
                            *knowledge.co_occurrences.entry(other.clone()).or_insert(0) += 1;
                        }
                    }
                }
            }

            let flags: Vec<&str> = normalized
                .iter()
                .filter(|arg| arg.starts_with('-'))
                .map(String::as_str)
                .collect();
            if flags.len() >= 2 {
                let combo = flags.join(" ");
                *entry.flag_combinations.entry(combo).or_insert(0) += 1;
            }

            if entry.arguments.len() > self.max_args_per_command {
                let excess = entry.arguments.len() - self.max_args_per_command;
                evict_lru_arguments(&mut entry.arguments, excess);
            }
        }

        self.enforce_command_cap();
    }

    /// Up to `max` argument suggestions for `command`, skipping any the user
    /// has already typed. Ranked by frecency, ties broken by usage count.
    pub fn suggestions(
        &self,
        command: &str,
        already_typed: &[String],
        max: usize,
    ) -> Vec<ArgumentSuggestion> {
        let Some(entry) = self.commands.get(&command.to_lowercase()) else {
            return Vec::new();
        };

        let now = OffsetDateTime::now_utc();
        let typed: HashSet<String> = already_typed.iter().map(|arg| arg.to_lowercase()).collect();

        let mut results: Vec<ArgumentSuggestion> = entry
            .arguments
            .iter()
            .filter(|(key, _)| !typed.contains(key.as_str()))
            .map(|(_, arg)| ArgumentSuggestion {
                text: arg.text.clone(),
                usage_count: arg.usage_count,
                last_used: arg.last_used,
                is_flag: arg.is_flag,
                score: frecency_score(
                    arg.usage_count,
                    entry.total_usage,
                    arg.last_used,
                    now,
                    self.decay_days,
                ),
                top_co_occurrence: arg
                    .co_occurrences
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(other, _)| {
                        entry
                            .arguments
                            .get(other)
                            .map_or_else(|| other.clone(), |a| a.text.clone())
                    }),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.usage_count.cmp(&a.usage_count))
        });
        results.truncate(max);
        results
    }

    pub fn command(&self, name: &str) -> Option<CommandKnowledge> {
        self.commands.get(&name.to_lowercase()).map(|c| c.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            commands: self.commands.len(),
            arguments: self.commands.iter().map(|c| c.arguments.len()).sum(),
            max_commands: self.max_commands,
            max_args_per_command: self.max_args_per_command,
        }
    }

    pub fn clear(&self) {
        self.commands.clear();
        self.baselines.clear();
    }

    // ---- Persistence support ----

    /// Usage of `argument` under `command` accumulated since the last save.
    pub fn delta(&self, command: &str, argument: &str) -> u64 {
        let key = command.to_lowercase();
        let Some(entry) = self.commands.get(&key) else {
            return 0;
        };
        let current = entry
            .arguments
            .get(&argument.to_lowercase())
            .map_or(0, |a| a.usage_count);
        let base = self.baselines.get(&key).map_or(0, |b| {
            b.arguments
                .get(&argument.to_lowercase())
                .copied()
                .unwrap_or(0)
        });
        current.saturating_sub(base)
    }

    /// Per-command deltas since the last save, for additive persistence.
    /// Commands with no new usage are omitted.
    pub fn snapshot_deltas(&self) -> Vec<CommandDelta> {
        let mut deltas = Vec::new();

        for entry in self.commands.iter() {
            let key = entry.key().clone();
            let base = self
                .baselines
                .get(&key)
                .map(|b| b.value().clone())
                .unwrap_or_default();

            let total_delta = entry.total_usage.saturating_sub(base.total_usage);

            let arguments: Vec<ArgumentDelta> = entry
                .arguments
                .iter()
                .filter_map(|(arg_key, arg)| {
                    let delta = arg
                        .usage_count
                        .saturating_sub(base.arguments.get(arg_key).copied().unwrap_or(0));
                    (delta > 0).then(|| ArgumentDelta {
                        text: arg_key.clone(),
                        usage_delta: delta,
                        first_seen: arg.first_seen,
                        last_used: arg.last_used,
                        is_flag: arg.is_flag,
                    })
                })
                .collect();

            let co_occurrences: Vec<(String, String, u64)> = entry
                .arguments
                .iter()
                .flat_map(|(arg_key, arg)| {
                    let base_co = base.co_occurrences.get(arg_key);
                    arg.co_occurrences
                        .iter()
                        .filter_map(|(other, count)| {
                            let delta = count.saturating_sub(
                                base_co.and_then(|m| m.get(other)).copied().unwrap_or(0),
                            );
                            (delta > 0).then(|| (arg_key.clone(), other.clone(), delta))
                        })
                        .collect::<Vec<_>>()
                })
                .collect();

            let flag_combinations: Vec<(String, u64)> = entry
                .flag_combinations
                .iter()
                .filter_map(|(flags, count)| {
                    let delta = count
                        .saturating_sub(base.flag_combinations.get(flags).copied().unwrap_or(0));
                    (delta > 0).then(|| (flags.clone(), delta))
                })
                .collect();

            if total_delta == 0
                && arguments.is_empty()
                && co_occurrences.is_empty()
                && flag_combinations.is_empty()
            {
                continue;
            }

            deltas.push(CommandDelta {
                name: key,
                total_delta,
                first_seen: entry.first_seen,
                last_used: entry.last_used,
                arguments,
                co_occurrences,
                flag_combinations,
            });
        }

        deltas
    }

    /// After a confirmed save, advance every baseline to the current counts.
    pub fn update_baseline(&self) {
        for entry in self.commands.iter() {
            let baseline = CommandBaseline {
                total_usage: entry.total_usage,
                arguments: entry
                    .arguments
                    .iter()
                    .map(|(k, a)| (k.clone(), a.usage_count))
                    .collect(),
                co_occurrences: entry
                    .arguments
                    .iter()
                    .map(|(k, a)| (k.clone(), a.co_occurrences.clone()))
                    .collect(),
                flag_combinations: entry.flag_combinations.clone(),
            };
            self.baselines.insert(entry.key().clone(), baseline);
        }
    }

    // ---- Load support ----
    // The initialize_* methods install persisted state and set the baseline
    // to match, so a save right after load writes nothing.

    pub fn initialize_command(
        &self,
        name: &str,
        total_usage: u64,
        first_seen: OffsetDateTime,
        last_used: OffsetDateTime,
    ) {
        let key = name.to_lowercase();
        let mut entry = self
            .commands
            .entry(key.clone())
            .or_insert_with(|| CommandKnowledge::new(name, first_seen));
        entry.total_usage = total_usage;
        entry.first_seen = first_seen;
        entry.last_used = last_used;
        drop(entry);

        self.baselines.entry(key).or_default().total_usage = total_usage;
    }

    pub fn initialize_argument(
        &self,
        command: &str,
        argument: &str,
        usage_count: u64,
        first_seen: OffsetDateTime,
        last_used: OffsetDateTime,
        is_flag: bool,
    ) {
        let key = command.to_lowercase();
        let arg_key = argument.to_lowercase();
        {
            let mut entry = self
                .commands
                .entry(key.clone())
                .or_insert_with(|| CommandKnowledge::new(command, first_seen));
            let arg = entry
                .arguments
                .entry(arg_key.clone())
                .or_insert_with(|| ArgumentKnowledge::new(argument, first_seen));
            arg.usage_count = usage_count;
            arg.first_seen = first_seen;
            arg.last_used = last_used;
            arg.is_flag = is_flag;
        }

        self.baselines
            .entry(key)
            .or_default()
            .arguments
            .insert(arg_key, usage_count);
    }

    pub fn initialize_co_occurrence(
        &self,
        command: &str,
        argument: &str,
        co_occurred_with: &str,
        count: u64,
    ) {
        let key = command.to_lowercase();
        let arg_key = argument.to_lowercase();
        let other_key = co_occurred_with.to_lowercase();
        {
            let Some(mut entry) = self.commands.get_mut(&key) else {
                return;
            };
            let Some(arg) = entry.arguments.get_mut(&arg_key) else {
                return;
            };
            arg.co_occurrences.insert(other_key.clone(), count);
        }

        self.baselines
            .entry(key)
            .or_default()
            .co_occurrences
            .entry(arg_key)
            .or_default()
            .insert(other_key, count);
    }

    pub fn initialize_flag_combination(&self, command: &str, flags: &str, count: u64) {
        let key = command.to_lowercase();
        {
            let Some(mut entry) = self.commands.get_mut(&key) else {
                return;
            };
            entry.flag_combinations.insert(flags.to_string(), count);
        }

        self.baselines
            .entry(key)
            .or_default()
            .flag_combinations
            .insert(flags.to_string(), count);
    }

    // ---- Eviction ----

    fn enforce_command_cap(&self) {
        while self.commands.len() > self.max_commands {
            let oldest = self
                .commands
                .iter()
                .min_by_key(|entry| entry.last_used)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.commands.remove(&key);
                    self.baselines.remove(&key);
                }
                None => break,
            }
        }
    }
}

fn evict_lru_arguments(arguments: &mut HashMap<String, ArgumentKnowledge>, excess: usize) {
    for _ in 0..excess {
        let oldest = arguments
            .iter()
            .min_by_key(|(_, arg)| arg.last_used)
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => {
                arguments.remove(&key);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use time::Duration;

    fn settings_with(max_commands: usize, max_args: usize) -> Settings {
        Settings::builder()
            .unwrap()
            .set_override("max_commands", max_commands as i64)
            .unwrap()
            .set_override("max_args_per_cmd", max_args as i64)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn learns_arguments_case_insensitively() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        graph.record_usage("Git", &args(&["commit", "-m", "msg"]), None);
        graph.record_usage("git", &args(&["Commit"]), None);

        let command = graph.command("GIT").unwrap();
        assert_eq!(command.total_usage, 2);
        assert_eq!(command.arguments.get("commit").unwrap().usage_count, 2);
        // original casing is preserved for display
        assert_eq!(command.arguments.get("commit").unwrap().text, "commit");
    }

    #[test]
    fn suggestions_rank_learned_arguments() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        for _ in 0..3 {
            graph.record_usage("git", &args(&["commit", "-m", "msg"]), None);
        }
        graph.record_usage("git", &args(&["push"]), None);

        let suggestions = graph.suggestions("git", &[], 10);
        let commit = suggestions.iter().find(|s| s.text == "commit").unwrap();
        let push = suggestions.iter().find(|s| s.text == "push").unwrap();
        assert!(commit.score > 0.0);
        assert!(commit.score > push.score);
        // the rarely-used argument sorts after the frequent ones
        assert_eq!(suggestions.last().unwrap().text, "push");
    }

    #[test]
    fn suggestions_skip_already_typed() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        graph.record_usage("git", &args(&["commit", "push"]), None);

        let suggestions = graph.suggestions("git", &args(&["COMMIT"]), 10);
        assert!(suggestions.iter().all(|s| s.text != "commit"));
        assert!(suggestions.iter().any(|s| s.text == "push"));
    }

    #[test]
    fn no_self_co_occurrence() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        graph.record_usage("docker", &args(&["run", "run", "-it"]), None);

        let command = graph.command("docker").unwrap();
        let run = command.arguments.get("run").unwrap();
        assert!(!run.co_occurrences.contains_key("run"));
        assert_eq!(run.co_occurrences.get("-it"), Some(&1));
    }

    #[test]
    fn flag_combinations_require_two_flags() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        graph.record_usage("docker", &args(&["run", "-i", "-t", "alpine"]), None);
        graph.record_usage("docker", &args(&["run", "-i", "alpine"]), None);

        let command = graph.command("docker").unwrap();
        assert_eq!(command.flag_combinations.get("-i -t"), Some(&1));
        assert_eq!(command.flag_combinations.len(), 1);
    }

    #[test]
    fn lru_evicts_least_recently_used_command() {
        let graph = KnowledgeGraph::new(&settings_with(2, 100));
        graph.record_usage("a", &[], None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        graph.record_usage("b", &[], None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        graph.record_usage("c", &[], None);

        assert!(!graph.contains("a"));
        assert!(graph.contains("b"));
        assert!(graph.contains("c"));
    }

    #[test]
    fn frecency_bounds_and_monotonicity() {
        let now = OffsetDateTime::now_utc();

        assert_eq!(frecency_score(0, 10, now, now, 30.0), 0.0);
        assert_eq!(frecency_score(5, 0, now, now, 30.0), 0.0);

        let low = frecency_score(1, 10, now, now, 30.0);
        let high = frecency_score(9, 10, now, now, 30.0);
        assert!(low < high);
        assert!((0.0..=1.0).contains(&low));
        assert!((0.0..=1.0).contains(&high));

        // same-day usage never pushes the score above 1
        let future = frecency_score(10, 10, now + Duration::hours(1), now, 30.0);
        assert!(future <= 1.0);
    }

    #[test]
    fn deltas_track_usage_since_baseline() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        graph.record_usage("git", &args(&["commit"]), None);
        graph.record_usage("git", &args(&["commit"]), None);

        assert_eq!(graph.delta("git", "commit"), 2);

        graph.update_baseline();
        assert_eq!(graph.delta("git", "commit"), 0);
        assert!(graph.snapshot_deltas().is_empty());

        graph.record_usage("git", &args(&["commit"]), None);
        assert_eq!(graph.delta("git", "commit"), 1);

        let deltas = graph.snapshot_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].total_delta, 1);
        assert_eq!(deltas[0].arguments.len(), 1);
        assert_eq!(deltas[0].arguments[0].usage_delta, 1);
    }

    #[test]
    fn initialize_sets_baseline() {
        let graph = KnowledgeGraph::new(&settings_with(500, 100));
        let now = OffsetDateTime::now_utc();
        graph.initialize_command("git", 7, now, now);
        graph.initialize_argument("git", "commit", 4, now, now, false);

        // freshly loaded state has no delta to persist
        assert!(graph.snapshot_deltas().is_empty());
        assert_eq!(graph.delta("git", "commit"), 0);

        graph.record_usage("git", &args(&["commit"]), None);
        assert_eq!(graph.delta("git", "commit"), 1);
        assert_eq!(graph.command("git").unwrap().total_usage, 8);
    }
}
