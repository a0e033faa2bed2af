//! Generic predictor.
//!
//! Turns the current command line and working directory into ranked
//! suggestions by consulting the knowledge graph, the directory engine, the
//! sequence predictor, and recent history. This is the latency-sensitive
//! path: every stage checks the cancellation flag and all errors fold into
//! an empty result.

use std::path::Path;
use std::time::Duration;

use time::OffsetDateTime;

use crate::dirnav::{DirSuggestion, DirectoryEngine, MatchKind};
use crate::knowledge::is_navigation_command;
use crate::settings::Settings;
use crate::stores::LearningStores;
use crate::suggestion::{CancelFlag, Suggestion, SuggestionSource, format_age};
use crate::workflow::normalize_command;

/// Hardcoded follow-ups offered when the user has typed a bare command.
const COMMON_NEXT_STEPS: &[(&str, &[&str])] = &[
    ("git", &["git status", "git pull", "git push"]),
    ("cargo", &["cargo build", "cargo test"]),
    ("docker", &["docker ps", "docker images"]),
    ("dotnet", &["dotnet build", "dotnet test"]),
];

const SEQUENCE_SCALE: f64 = 0.9;
const COMMON_NEXT_SCORE: f64 = 0.85;
/// Learned directory suggestions land in this band.
const DIR_LEARNED_FLOOR: f64 = 0.85;
const DIR_LEARNED_CEIL: f64 = 1.0;
/// How many recent entries feed the recent-use boost.
const RECENT_WINDOW: usize = 20;

/// The parsed state of the user's input line.
struct InputContext<'a> {
    command: &'a str,
    /// Completed argument tokens (excludes the word being typed).
    typed_args: Vec<String>,
    /// The word currently being completed; empty when ready for a new token.
    current_word: String,
}

fn parse_input(input: &str) -> Option<InputContext<'_>> {
    let mut tokens = input.split_whitespace();
    let command = tokens.next()?;
    let mut args: Vec<String> = tokens.map(str::to_string).collect();

    let ready_for_new_token = input.ends_with(char::is_whitespace);
    let current_word = if ready_for_new_token {
        String::new()
    } else {
        args.pop().unwrap_or_default()
    };

    Some(InputContext {
        command,
        typed_args: args,
        current_word,
    })
}

/// Context analysis + merging of learner outputs.
pub struct Predictor {
    stores: LearningStores,
    directories: DirectoryEngine,
    max_results: usize,
    partial_commands: bool,
}

impl Predictor {
    pub fn new(stores: LearningStores, settings: &Settings) -> Self {
        Self {
            stores,
            directories: DirectoryEngine::new(settings),
            max_results: settings.max_results,
            partial_commands: settings.partial_command_predictions,
        }
    }

    pub fn stores(&self) -> &LearningStores {
        &self.stores
    }

    /// Ranked suggestions for the input line. Never fails; a degraded
    /// engine returns an empty list.
    pub fn suggest(&self, input: &str, cwd: &Path, cancel: &CancelFlag) -> Vec<Suggestion> {
        let Some(context) = parse_input(input) else {
            return Vec::new();
        };

        let mut results = if is_navigation_command(context.command) {
            self.directory_suggestions(&context, cwd)
        } else {
            self.argument_suggestions(&context, cancel)
        };

        if !cancel.is_cancelled() && context.typed_args.is_empty() && context.current_word.is_empty()
        {
            self.add_context_suggestions(&context, input, &mut results);
        }

        finish(&mut results, self.max_results);
        results
    }

    /// Workflow follow-up suggestions based on the most recent execution.
    pub fn workflow_suggestions(&self) -> Vec<Suggestion> {
        let Some(last) = self.stores.history.most_recent() else {
            return Vec::new();
        };
        let elapsed = (OffsetDateTime::now_utc() - last.timestamp)
            .try_into()
            .unwrap_or(Duration::ZERO);
        let from = normalize_command(&last.command_line);

        self.stores
            .workflows
            .predict(&last.command_line, elapsed)
            .into_iter()
            .map(|(to, confidence)| {
                Suggestion::new(
                    to,
                    format!("often follows '{from}'"),
                    confidence,
                    SuggestionSource::Workflow,
                )
            })
            .collect()
    }

    fn directory_suggestions(&self, context: &InputContext<'_>, cwd: &Path) -> Vec<Suggestion> {
        let word = &context.current_word;
        let raw = self
            .directories
            .suggest(&self.stores.knowledge, word, cwd, self.max_results * 2);

        let max_learned = raw
            .iter()
            .filter(|s| s.usage_count > 0)
            .map(|s| s.score)
            .fold(0.0_f64, f64::max);

        raw.into_iter()
            .map(|dir| {
                let score = scale_directory_score(&dir, max_learned);
                Suggestion::new(dir.display_path, dir.tooltip, score, SuggestionSource::Directory)
            })
            .collect()
    }

    fn argument_suggestions(
        &self,
        context: &InputContext<'_>,
        cancel: &CancelFlag,
    ) -> Vec<Suggestion> {
        let candidates = self.stores.knowledge.suggestions(
            context.command,
            &context.typed_args,
            self.max_results * 2,
        );
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let word = context.current_word.to_lowercase();
        let now = OffsetDateTime::now_utc();
        let recent_boost = self.recent_use_counts(context.command);

        candidates
            .into_iter()
            .filter(|arg| word.is_empty() || arg.text.to_lowercase().starts_with(&word))
            .map(|arg| {
                let mut score = arg.score;
                if let Some(count) = recent_boost
                    .iter()
                    .find(|(text, _)| text.eq_ignore_ascii_case(&arg.text))
                    .map(|(_, count)| *count)
                {
                    let boost = 1.0 + 0.1 * count.min(3) as f64;
                    score = (score * boost).min(1.0);
                }

                let mut tooltip = format!(
                    "used {}x, {}",
                    arg.usage_count,
                    format_age(arg.last_used, now)
                );
                if let Some(co) = &arg.top_co_occurrence {
                    tooltip.push_str(&format!(", often with {co}"));
                }

                Suggestion::new(arg.text, tooltip, score, SuggestionSource::Learned)
            })
            .collect()
    }

    fn add_context_suggestions(
        &self,
        context: &InputContext<'_>,
        input: &str,
        results: &mut Vec<Suggestion>,
    ) {
        let input_trimmed = input.trim();
        let input_lower = input_trimmed.to_lowercase();

        // sequence predictions that extend what was typed
        let recent: Vec<String> = self
            .stores
            .history
            .recent(5)
            .iter()
            .map(|entry| normalize_command(&entry.command_line))
            .collect();
        for (prediction, score) in self.stores.sequences.predict(&recent) {
            if prediction.starts_with(&input_lower) && prediction != input_lower {
                results.push(Suggestion::new(
                    prediction,
                    "predicted next command".to_string(),
                    SEQUENCE_SCALE * score,
                    SuggestionSource::Sequence,
                ));
            }
        }

        let command_lower = context.command.to_lowercase();
        for (command, next_steps) in COMMON_NEXT_STEPS {
            if *command == command_lower {
                for step in *next_steps {
                    if step.starts_with(&input_lower) && *step != input_lower {
                        results.push(Suggestion::new(
                            *step,
                            "common next step".to_string(),
                            COMMON_NEXT_SCORE,
                            SuggestionSource::Sequence,
                        ));
                    }
                }
            }
        }
    }

    /// How often each argument of `command` appeared in recent history.
    /// Snapshot read; concurrent writers may or may not be visible.
    fn recent_use_counts(&self, command: &str) -> Vec<(String, u64)> {
        if !self.partial_commands {
            return Vec::new();
        }
        let mut counts: Vec<(String, u64)> = Vec::new();
        for entry in self.stores.history.recent(RECENT_WINDOW) {
            if !entry.command.eq_ignore_ascii_case(command) {
                continue;
            }
            for argument in &entry.arguments {
                match counts
                    .iter()
                    .position(|(text, _)| text.eq_ignore_ascii_case(argument))
                {
                    Some(index) => counts[index].1 += 1,
                    None => counts.push((argument.clone(), 1)),
                }
            }
        }
        counts
    }
}

fn scale_directory_score(dir: &DirSuggestion, max_learned: f64) -> f64 {
    match dir.match_kind {
        MatchKind::WellKnown => 1.0,
        MatchKind::Filesystem => dir.score.min(0.6),
        _ if dir.usage_count > 0 => {
            let relative = if max_learned > 0.0 {
                (dir.score / max_learned).clamp(0.0, 1.0)
            } else {
                0.0
            };
            DIR_LEARNED_FLOOR + (DIR_LEARNED_CEIL - DIR_LEARNED_FLOOR) * relative
        }
        _ => dir.score.min(0.6),
    }
}

/// Sort by score descending (flags win ties), deduplicate, truncate.
fn finish(results: &mut Vec<Suggestion>, max: usize) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let a_flag = a.text.starts_with('-');
                let b_flag = b.text.starts_with('-');
                b_flag.cmp(&a_flag)
            })
    });
    let mut seen = std::collections::HashSet::new();
    results.retain(|s| seen.insert(s.text.to_lowercase()));
    results.truncate(max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn settings() -> Settings {
        Settings::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn predictor() -> Predictor {
        let settings = settings();
        Predictor::new(LearningStores::new(&settings), &settings)
    }

    fn record(p: &Predictor, command: &str, line: &str, args: &[&str]) {
        p.stores().record_command(
            command,
            line,
            &args.iter().map(|s| (*s).to_string()).collect::<Vec<_>>(),
            true,
            None,
            OffsetDateTime::now_utc(),
        );
    }

    #[test]
    fn learned_argument_completes_partial_word() {
        let p = predictor();
        for _ in 0..3 {
            record(&p, "git", "git commit -m msg", &["commit", "-m", "msg"]);
        }

        let results = p.suggest("git co", Path::new("/"), &CancelFlag::new());
        let commit = results.iter().find(|s| s.text == "commit").unwrap();
        assert!(commit.score > 0.0);
        assert!(results.iter().all(|s| s.text.to_lowercase().starts_with("co")));
    }

    #[test]
    fn co_occurrence_shows_in_tooltip() {
        let p = predictor();
        for _ in 0..5 {
            record(&p, "docker", "docker run -it alpine", &["run", "-it", "alpine"]);
        }
        record(&p, "docker", "docker run alpine", &["run", "alpine"]);

        let results = p.suggest("docker run ", Path::new("/"), &CancelFlag::new());
        let top3: Vec<&str> = results.iter().take(3).map(|s| s.text.as_str()).collect();
        assert!(top3.contains(&"-it"));

        let it = results.iter().find(|s| s.text == "-it").unwrap();
        assert!(it.description.contains("often with alpine"));
    }

    #[test]
    fn navigation_delegates_to_directory_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let alpha = tmp.path().join("alpha");
        std::fs::create_dir(&alpha).unwrap();

        let p = predictor();
        let alpha_str = alpha.to_string_lossy().into_owned();
        for _ in 0..10 {
            record(&p, "cd", &format!("cd {alpha_str}"), &[alpha_str.as_str()]);
        }

        let results = p.suggest("cd alph", tmp.path(), &CancelFlag::new());
        let hit = results
            .iter()
            .find(|s| s.text.contains("alpha"))
            .expect("alpha suggested");
        assert_eq!(hit.source, SuggestionSource::Directory);
        assert!(hit.score >= 0.85);
    }

    #[test]
    fn bare_command_gets_sequence_extensions() {
        let p = predictor();
        let now = OffsetDateTime::now_utc();
        for _ in 0..3 {
            p.stores()
                .sequences
                .record_transition("git add", "git commit", now);
        }
        record(&p, "git", "git add .", &["add", "."]);

        let results = p.suggest("git", Path::new("/"), &CancelFlag::new());
        assert!(results.iter().any(|s| s.text == "git commit"));
        assert!(results.iter().any(|s| s.text == "git status"));
    }

    #[test]
    fn cancelled_flag_short_circuits() {
        let p = predictor();
        record(&p, "git", "git status", &["status"]);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let results = p.suggest("git ", Path::new("/"), &cancel);
        assert!(results.is_empty());
    }

    #[test]
    fn flags_win_score_ties() {
        let mut results = vec![
            Suggestion::new("verbose", "", 0.5, SuggestionSource::Learned),
            Suggestion::new("-v", "", 0.5, SuggestionSource::Learned),
        ];
        finish(&mut results, 10);
        assert_eq!(results[0].text, "-v");
    }
}
