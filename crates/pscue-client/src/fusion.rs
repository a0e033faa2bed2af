//! Rank fusion.
//!
//! Merges the known-completions catalog, learned/sequence suggestions, and
//! workflow suggestions into one deduplicated ranking, and folds the chosen
//! completion back into the user's input span.

use std::collections::HashMap;

use crate::settings::Settings;
use crate::suggestion::{Suggestion, SuggestionSource};

/// A completion supplied by the external known-completions catalog.
/// The list order is a relevance prior.
#[derive(Clone, Debug)]
pub struct KnownCompletion {
    pub text: String,
    pub tooltip: String,
}

#[derive(Clone, Copy, Debug)]
pub struct FusionConfig {
    pub known_step: f64,
    pub learned_boost: f64,
    pub workflow_boost: f64,
    pub max_results: usize,
}

impl FusionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            known_step: settings.fusion_known_step,
            learned_boost: settings.fusion_learned_boost,
            workflow_boost: settings.fusion_workflow_boost,
            max_results: settings.fusion_max_results,
        }
    }
}

struct Merged {
    suggestion: Suggestion,
    collided: bool,
}

/// Merge the three suggestion streams, deduplicating case-insensitively by
/// text. A collision keeps the max score, multiplies in the stream boost
/// (capped at 1.0), and concatenates tooltips.
pub fn fuse(
    known: &[KnownCompletion],
    learned: Vec<Suggestion>,
    workflow: Vec<Suggestion>,
    config: &FusionConfig,
) -> Vec<Suggestion> {
    let mut merged: HashMap<String, Merged> = HashMap::new();

    for (index, completion) in known.iter().enumerate() {
        let score = (1.0 - config.known_step * index as f64).max(0.0);
        let key = completion.text.to_lowercase();
        merged.entry(key).or_insert_with(|| Merged {
            suggestion: Suggestion::new(
                completion.text.clone(),
                completion.tooltip.clone(),
                score,
                SuggestionSource::Known,
            ),
            collided: false,
        });
    }

    for suggestion in learned {
        merge_one(&mut merged, suggestion, config.learned_boost);
    }
    for suggestion in workflow {
        merge_one(&mut merged, suggestion, config.workflow_boost);
    }

    let mut results: Vec<Merged> = merged.into_values().collect();
    results.sort_by(|a, b| {
        b.suggestion
            .score
            .partial_cmp(&a.suggestion.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.collided.cmp(&a.collided))
    });
    results.truncate(config.max_results);
    results.into_iter().map(|m| m.suggestion).collect()
}

fn merge_one(merged: &mut HashMap<String, Merged>, suggestion: Suggestion, boost: f64) {
    use std::collections::hash_map::Entry;

    match merged.entry(suggestion.text.to_lowercase()) {
        Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            existing.suggestion.score =
                (existing.suggestion.score.max(suggestion.score) * boost).min(1.0);
            existing.collided = true;
            if !suggestion.description.is_empty()
                && !existing.suggestion.description.contains(&suggestion.description)
            {
                if existing.suggestion.description.is_empty() {
                    existing.suggestion.description = suggestion.description;
                } else {
                    existing.suggestion.description = format!(
                        "{}; {}",
                        existing.suggestion.description, suggestion.description
                    );
                }
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(Merged {
                suggestion,
                collided: false,
            });
        }
    }
}

/// Windows drive, UNC, or unix-rooted path.
pub fn is_absolute_path(text: &str) -> bool {
    let bytes = text.as_bytes();
    (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
        || text.starts_with("\\\\")
        || text.starts_with('/')
}

/// Combine the input span and a chosen completion into the final insertable
/// string.
///
/// The word being completed is replaced when the completion extends it (or
/// when the completion is an absolute path); otherwise the completion is
/// appended as a new token.
pub fn fold(input: &str, completion: &str) -> String {
    let last_space = input.rfind(' ');
    let (head, last_word) = match last_space {
        Some(index) => (&input[..=index], &input[index + 1..]),
        None => ("", input),
    };

    let last_word_lower = last_word.to_lowercase();
    let first_token = completion.split_whitespace().next().unwrap_or("");

    if completion.contains(' ')
        && first_token.to_lowercase().starts_with(&last_word_lower)
    {
        format!("{head}{completion}")
    } else if completion.to_lowercase().starts_with(&last_word_lower) {
        format!("{head}{completion}")
    } else if is_absolute_path(completion) && last_space.is_some() {
        format!("{head}{completion}")
    } else {
        format!("{input} {completion}")
    }
}
