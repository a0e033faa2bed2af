//! Directory navigation engine.
//!
//! Ranks "jump to directory" suggestions for a partial path by merging four
//! stages: well-known shortcuts, directories learned from `cd` usage, a
//! direct listing of the relevant parent, and an optional bounded recursive
//! search. Learned entries are scored by fuzzy match quality, frequency,
//! recency, and distance from the current directory.

pub mod fuzzy;
pub mod score;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::knowledge::KnowledgeGraph;
use crate::settings::Settings;
use crate::suggestion::format_age;
use score::ScoreWeights;

const SHORTCUT_HOME_SCORE: f64 = 1000.0;
const SHORTCUT_PARENT_SCORE: f64 = 999.0;
/// Filesystem listing results sit below learned paths.
const FILESYSTEM_BASE: f64 = 0.6;
/// Recursive matches rank below direct children.
const RECURSIVE_BASE: f64 = 0.5;
const LISTING_TTL: Duration = Duration::from_secs(5);
/// Upper bound on directories visited by the recursive stage.
const RECURSIVE_VISIT_BUDGET: usize = 2_000;

/// How a directory suggestion matched the user's input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchKind {
    WellKnown,
    Exact,
    Prefix,
    Fuzzy,
    Learned,
    Filesystem,
}

/// A ranked directory suggestion.
#[derive(Clone, Debug)]
pub struct DirSuggestion {
    pub path: PathBuf,
    pub display_path: String,
    pub score: f64,
    pub usage_count: u64,
    pub last_used: Option<OffsetDateTime>,
    pub match_kind: MatchKind,
    pub tooltip: String,
}

/// Expand `~` and resolve a relative path against `cwd`.
pub fn expand_path(input: &str, cwd: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(input).into_owned();
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Canonical absolute form of `input`, or `None` when it cannot be resolved
/// (callers fall back to the original string).
pub fn normalize_path(input: &str, cwd: Option<&Path>) -> Option<String> {
    if input.is_empty() || input.starts_with('-') {
        return None;
    }
    let expanded = shellexpand::tilde(input).into_owned();
    let path = PathBuf::from(&expanded);
    let path = if path.is_absolute() {
        path
    } else {
        cwd?.join(path)
    };
    let canonical = path.canonicalize().ok()?;
    Some(canonical.to_string_lossy().into_owned())
}

fn is_absolute_input(word: &str) -> bool {
    let expanded = shellexpand::tilde(word);
    Path::new(expanded.as_ref()).is_absolute() || word.starts_with("\\\\")
}

/// The portion of the input after the last path separator.
fn input_leaf(word: &str) -> String {
    word.rsplit(['/', '\\']).next().unwrap_or(word).to_string()
}

/// Resolve symlinks and append a trailing separator for display.
fn normalize_display(path: &Path) -> String {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut display = resolved.to_string_lossy().into_owned();
    if !display.ends_with(std::path::MAIN_SEPARATOR) {
        display.push(std::path::MAIN_SEPARATOR);
    }
    display
}

struct CachedListing {
    dirs: Vec<PathBuf>,
    at: Instant,
}

/// Frecency + fuzzy + distance ranking over learned and on-disk directories.
pub struct DirectoryEngine {
    weights: ScoreWeights,
    min_match_pct: f64,
    max_depth: usize,
    recursive: bool,
    max_learned: usize,
    decay_days: f64,
    blocklist: Vec<String>,
    listings: DashMap<PathBuf, CachedListing>,
}

impl DirectoryEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            weights: ScoreWeights {
                frequency: settings.pcd_frequency_weight,
                recency: settings.pcd_recency_weight,
                distance: settings.pcd_distance_weight,
                exact_match_boost: settings.pcd_exact_match_boost,
            },
            min_match_pct: settings.pcd_min_match_pct,
            max_depth: settings.pcd_max_depth,
            recursive: settings.pcd_recursive_search,
            max_learned: settings.pcd_max_learned,
            decay_days: settings.decay_days,
            blocklist: settings.pcd_blocklist.clone(),
            listings: DashMap::new(),
        }
    }

    /// Ranked suggestions for partial input `word` from `cwd`.
    pub fn suggest(
        &self,
        knowledge: &KnowledgeGraph,
        word: &str,
        cwd: &Path,
        max: usize,
    ) -> Vec<DirSuggestion> {
        let mut collected = Vec::new();
        let absolute = is_absolute_input(word);
        let query = input_leaf(word);

        if !absolute {
            self.collect_shortcuts(word, cwd, &mut collected);
        }
        self.collect_learned(knowledge, word, &query, cwd, absolute, &mut collected);
        self.collect_children(word, &query, cwd, absolute, &mut collected);
        if self.recursive && !absolute && !query.is_empty() {
            self.collect_recursive(&query, cwd, &mut collected);
        }

        // Dedup by normalized display path, keeping the strongest entry.
        use std::collections::hash_map::Entry;
        let mut best: HashMap<String, DirSuggestion> = HashMap::new();
        for mut suggestion in collected {
            if suggestion.match_kind != MatchKind::WellKnown {
                suggestion.display_path = normalize_display(&suggestion.path);
            }
            match best.entry(suggestion.display_path.clone()) {
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if (suggestion.score, suggestion.usage_count)
                        > (existing.score, existing.usage_count)
                    {
                        *existing = suggestion;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(suggestion);
                }
            }
        }

        // The directory the user is already in is never worth jumping to.
        let cwd_canonical = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
        let mut results: Vec<DirSuggestion> = best
            .into_values()
            .filter(|s| s.match_kind == MatchKind::WellKnown || (s.path != cwd && s.path != cwd_canonical))
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

    fn collect_shortcuts(&self, word: &str, cwd: &Path, out: &mut Vec<DirSuggestion>) {
        if "~".starts_with(word) {
            if let Some(home) = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
                out.push(DirSuggestion {
                    path: home,
                    display_path: "~".to_string(),
                    score: SHORTCUT_HOME_SCORE,
                    usage_count: 0,
                    last_used: None,
                    match_kind: MatchKind::WellKnown,
                    tooltip: "home directory".to_string(),
                });
            }
        }
        if "..".starts_with(word) {
            if let Some(parent) = cwd.parent() {
                out.push(DirSuggestion {
                    path: parent.to_path_buf(),
                    display_path: "..".to_string(),
                    score: SHORTCUT_PARENT_SCORE,
                    usage_count: 0,
                    last_used: None,
                    match_kind: MatchKind::WellKnown,
                    tooltip: "parent directory".to_string(),
                });
            }
        }
    }

    fn collect_learned(
        &self,
        knowledge: &KnowledgeGraph,
        word: &str,
        query: &str,
        cwd: &Path,
        absolute: bool,
        out: &mut Vec<DirSuggestion>,
    ) {
        let learned = knowledge.suggestions("cd", &[], self.max_learned);
        let max_usage = learned
            .iter()
            .map(|s| s.usage_count)
            .max()
            .unwrap_or(1)
            .max(1);
        let typed_path = expand_path(word, cwd);
        let now = OffsetDateTime::now_utc();

        for item in learned {
            if item.text == "-" || item.text == "." {
                continue;
            }
            let path = expand_path(&item.text, cwd);
            if path == cwd || !path.is_dir() {
                continue;
            }
            if self.is_blocked(&path, word) {
                continue;
            }
            // Completing /a/b/c with an ancestor of /a/b/c is a no-op jump.
            if absolute && typed_path.starts_with(&path) {
                continue;
            }

            let leaf = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let matched = if absolute {
                fuzzy::match_score(
                    &typed_path.to_string_lossy(),
                    &path.to_string_lossy(),
                    self.min_match_pct,
                )
            } else {
                fuzzy::match_score(query, &leaf, self.min_match_pct)
            };
            let Some((match_score, kind)) = matched else {
                continue;
            };

            let exact = kind == MatchKind::Exact;
            let freq_score = item.usage_count as f64 / max_usage as f64;
            let age_days = ((now - item.last_used).as_seconds_f64() / 86_400.0).max(0.0);
            let rec_score = (-age_days / self.decay_days).exp().min(1.0);
            let dist_score = score::distance_score(&path, cwd);
            let total = score::learned_score(
                match_score,
                exact,
                freq_score,
                rec_score,
                dist_score,
                &self.weights,
            );

            out.push(DirSuggestion {
                display_path: path.to_string_lossy().into_owned(),
                tooltip: format!(
                    "visited {}x, {}",
                    item.usage_count,
                    format_age(item.last_used, now)
                ),
                path,
                score: total,
                usage_count: item.usage_count,
                last_used: Some(item.last_used),
                match_kind: if query.is_empty() {
                    MatchKind::Learned
                } else {
                    kind
                },
            });
        }
    }

    fn collect_children(
        &self,
        word: &str,
        query: &str,
        cwd: &Path,
        absolute: bool,
        out: &mut Vec<DirSuggestion>,
    ) {
        let (parent, filter) = if absolute {
            let typed = expand_path(word, cwd);
            if word.ends_with('/') || word.ends_with('\\') {
                (typed, String::new())
            } else {
                let parent = typed.parent().map(Path::to_path_buf);
                match parent {
                    Some(parent) => (parent, query.to_string()),
                    None => (typed, String::new()),
                }
            }
        } else {
            (cwd.to_path_buf(), query.to_string())
        };

        let filter_lower = filter.to_lowercase();
        for child in self.list_dirs(&parent) {
            let name = child
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.is_blocked(&child, word) {
                continue;
            }
            // listing stage only does prefix/substring matching
            if !filter_lower.is_empty() && !name.to_lowercase().contains(&filter_lower) {
                continue;
            }
            let match_score = if filter_lower.is_empty() {
                1.0
            } else {
                fuzzy::match_score(&filter, &name, self.min_match_pct)
                    .map(|(score, _)| score)
                    .unwrap_or(0.0)
            };

            out.push(DirSuggestion {
                display_path: child.to_string_lossy().into_owned(),
                path: child,
                score: FILESYSTEM_BASE * match_score,
                usage_count: 0,
                last_used: None,
                match_kind: MatchKind::Filesystem,
                tooltip: "directory".to_string(),
            });
        }
    }

    fn collect_recursive(&self, query: &str, cwd: &Path, out: &mut Vec<DirSuggestion>) {
        let mut stack = vec![(cwd.to_path_buf(), 0usize)];
        let mut visited = 0usize;

        while let Some((dir, depth)) = stack.pop() {
            if depth >= self.max_depth || visited >= RECURSIVE_VISIT_BUDGET {
                break;
            }
            visited += 1;

            for child in self.list_dirs(&dir) {
                let name = child
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if self.is_blocked(&child, query) {
                    continue;
                }
                if let Some((match_score, _)) = fuzzy::match_score(query, &name, self.min_match_pct)
                {
                    if match_score > 0.0 {
                        out.push(DirSuggestion {
                            display_path: child.to_string_lossy().into_owned(),
                            path: child.clone(),
                            score: RECURSIVE_BASE * match_score,
                            usage_count: 0,
                            last_used: None,
                            match_kind: MatchKind::Fuzzy,
                            tooltip: "directory".to_string(),
                        });
                    }
                }
                stack.push((child, depth + 1));
            }
        }
    }

    fn list_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        if let Some(cached) = self.listings.get(dir) {
            if cached.at.elapsed() < LISTING_TTL {
                return cached.dirs.clone();
            }
        }

        let dirs: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|entry| {
                        entry
                            .file_type()
                            .map(|ft| ft.is_dir() || ft.is_symlink())
                            .unwrap_or(false)
                    })
                    .map(|entry| entry.path())
                    .filter(|path| path.is_dir())
                    .collect()
            })
            .unwrap_or_default();

        self.listings.insert(
            dir.to_path_buf(),
            CachedListing {
                dirs: dirs.clone(),
                at: Instant::now(),
            },
        );
        dirs
    }

    fn is_blocked(&self, path: &Path, input: &str) -> bool {
        let Some(leaf) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            return false;
        };
        let input_lower = input.to_lowercase();
        self.blocklist
            .iter()
            .any(|pattern| leaf == pattern.to_lowercase() && !input_lower.contains(&pattern.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn engine() -> DirectoryEngine {
        let settings: Settings = Settings::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        DirectoryEngine::new(&settings)
    }

    fn graph() -> KnowledgeGraph {
        let settings: Settings = Settings::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        KnowledgeGraph::new(&settings)
    }

    #[test]
    fn shortcuts_for_empty_input() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let results = engine().suggest(&graph(), "", &sub, 10);
        assert_eq!(results[0].display_path, "~");
        assert_eq!(results[0].match_kind, MatchKind::WellKnown);
        assert_eq!(results[1].display_path, "..");
    }

    #[test]
    fn learned_directory_ranks_high_on_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let projects = tmp.path().join("projects");
        let alpha = projects.join("alpha");
        std::fs::create_dir_all(&alpha).unwrap();

        let kg = graph();
        let alpha_str = alpha.to_string_lossy().into_owned();
        for _ in 0..10 {
            kg.record_usage("cd", &[alpha_str.clone()], Some(tmp.path()));
        }

        let results = engine().suggest(&kg, "alph", &projects, 10);
        let hit = results
            .iter()
            .find(|s| s.path.ends_with("alpha"))
            .expect("alpha suggested");
        assert!(matches!(hit.match_kind, MatchKind::Prefix | MatchKind::Exact));
        assert!(hit.usage_count >= 10);
        assert!(hit.tooltip.contains("visited"));
        // learned entry outranks a plain filesystem listing of the same name
        assert!(hit.score > FILESYSTEM_BASE);
    }

    #[test]
    fn blocklisted_leaf_is_hidden_unless_typed() {
        let tmp = tempfile::tempdir().unwrap();
        let modules = tmp.path().join("node_modules");
        let src = tmp.path().join("src");
        std::fs::create_dir(&modules).unwrap();
        std::fs::create_dir(&src).unwrap();

        let e = engine();
        let hidden = e.suggest(&graph(), "mod", tmp.path(), 10);
        assert!(hidden.iter().all(|s| !s.path.ends_with("node_modules")));

        let typed = e.suggest(&graph(), "node_modules", tmp.path(), 10);
        assert!(typed.iter().any(|s| s.path.ends_with("node_modules")));
    }

    #[test]
    fn dedup_keeps_strongest_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let alpha = tmp.path().join("alpha");
        std::fs::create_dir(&alpha).unwrap();

        let kg = graph();
        let alpha_str = alpha.to_string_lossy().into_owned();
        for _ in 0..5 {
            kg.record_usage("cd", &[alpha_str.clone()], Some(tmp.path()));
        }

        // learned stage and listing stage both produce alpha; only one survives
        let results = engine().suggest(&kg, "alpha", tmp.path(), 10);
        let hits: Vec<_> = results.iter().filter(|s| s.path.ends_with("alpha")).collect();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].usage_count >= 5);
    }

    #[test]
    fn current_directory_is_not_suggested() {
        let tmp = tempfile::tempdir().unwrap();
        let kg = graph();
        let here = tmp.path().to_string_lossy().into_owned();
        kg.record_usage("cd", &[here.clone()], None);

        let results = engine().suggest(&kg, &here, tmp.path(), 10);
        let canonical = tmp.path().canonicalize().unwrap();
        assert!(results.iter().all(|s| s.path != canonical && s.path != tmp.path()));
    }

    #[test]
    fn normalize_path_resolves_relative_and_fails_soft() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let resolved = normalize_path("sub", Some(tmp.path())).unwrap();
        assert!(resolved.ends_with("sub"));

        assert!(normalize_path("does-not-exist-xyz", Some(tmp.path())).is_none());
        assert!(normalize_path("-", Some(tmp.path())).is_none());
    }
}
