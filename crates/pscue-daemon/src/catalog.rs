//! Known-completions catalog seam.
//!
//! The real catalog (per-tool completion definitions for git, gh, scoop and
//! friends) is an external collaborator; the daemon only consumes this
//! trait. A small static sample ships for default wiring and tests.

use pscue_client::fusion::KnownCompletion;

/// Source of curated completions for supported tools. List order is a
/// relevance prior consumed by rank fusion.
pub trait CompletionCatalog: Send + Sync {
    /// Completions for the given command-line context.
    ///
    /// `word_to_complete` is the partial token (may be empty);
    /// `include_dynamic_arguments` asks the catalog to also produce values
    /// that require running the tool (branch names, container ids, ...).
    fn completions(
        &self,
        command_line: &str,
        word_to_complete: &str,
        include_dynamic_arguments: bool,
    ) -> Vec<KnownCompletion>;
}

/// Static sample catalog covering a handful of common tools.
#[derive(Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    pub fn new() -> Self {
        Self
    }
}

const GIT_SUBCOMMANDS: &[(&str, &str)] = &[
    ("status", "show the working tree status"),
    ("add", "add file contents to the index"),
    ("commit", "record changes to the repository"),
    ("push", "update remote refs"),
    ("pull", "fetch and integrate"),
    ("checkout", "switch branches or restore files"),
    ("branch", "list or manage branches"),
    ("log", "show commit logs"),
];

const DOCKER_SUBCOMMANDS: &[(&str, &str)] = &[
    ("run", "run a command in a new container"),
    ("ps", "list containers"),
    ("images", "list images"),
    ("build", "build an image"),
    ("exec", "run a command in a running container"),
];

const GH_SUBCOMMANDS: &[(&str, &str)] = &[
    ("pr", "work with pull requests"),
    ("issue", "work with issues"),
    ("repo", "work with repositories"),
];

const SCOOP_SUBCOMMANDS: &[(&str, &str)] = &[
    ("install", "install an app"),
    ("update", "update apps"),
    ("search", "search for apps"),
    ("list", "list installed apps"),
];

impl CompletionCatalog for StaticCatalog {
    fn completions(
        &self,
        command_line: &str,
        word_to_complete: &str,
        _include_dynamic_arguments: bool,
    ) -> Vec<KnownCompletion> {
        let mut tokens = command_line.split_whitespace();
        let Some(command) = tokens.next() else {
            return Vec::new();
        };

        let entries = match command.to_lowercase().as_str() {
            "git" => GIT_SUBCOMMANDS,
            "docker" => DOCKER_SUBCOMMANDS,
            "gh" => GH_SUBCOMMANDS,
            "scoop" => SCOOP_SUBCOMMANDS,
            _ => return Vec::new(),
        };

        // A subcommand is only offered while the first argument is still
        // being typed.
        if tokens.next().is_some() {
            return Vec::new();
        }

        let word = word_to_complete.to_lowercase();
        entries
            .iter()
            .filter(|(text, _)| word.is_empty() || text.to_lowercase().starts_with(&word))
            .map(|(text, tooltip)| KnownCompletion {
                text: (*text).to_string(),
                tooltip: (*tooltip).to_string(),
            })
            .collect()
    }
}
