//! Completion component.
//!
//! Owns the completion cache and the known-completions catalog, and serves
//! the IPC completion/debug requests. Results are generated for the command
//! context only (the partial word is excluded from both the cache key and
//! generation) and sent unfiltered - the client filters by
//! `word_to_complete`.

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use pscue_client::cache::CompletionCache;
use pscue_client::fusion::{self, FusionConfig};
use pscue_client::predictor::Predictor;
use pscue_client::settings::Settings;
use pscue_client::stores::LearningStores;
use pscue_client::suggestion::CancelFlag;

use crate::catalog::CompletionCatalog;
use crate::{
    daemon::{Component, DaemonHandle},
    events::DaemonEvent,
    protocol::{
        CompletionRequest, CompletionResponse, DebugCacheEntry, DebugRequest, DebugRequestType,
        DebugResponse, DebugStats,
    },
};

/// How often expired cache entries are swept.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CompletionInner {
    predictor: Predictor,
    cache: CompletionCache,
    cache_ttl: Duration,
    catalog: Arc<dyn CompletionCatalog>,
    fusion: FusionConfig,
    handle: tokio::sync::RwLock<Option<DaemonHandle>>,
}

/// Completion component - answers IPC requests and reacts to cache events.
pub struct CompletionComponent {
    inner: Arc<CompletionInner>,
    sweeper: Option<tokio::task::JoinHandle<()>>,
}

impl CompletionComponent {
    pub fn new(
        stores: LearningStores,
        settings: &Settings,
        catalog: Arc<dyn CompletionCatalog>,
    ) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                predictor: Predictor::new(stores, settings),
                cache: CompletionCache::from_settings(settings),
                cache_ttl: Duration::from_secs(settings.cache_ttl_seconds),
                catalog,
                fusion: FusionConfig::from_settings(settings),
                handle: tokio::sync::RwLock::new(None),
            }),
            sweeper: None,
        }
    }

    /// Get the IPC service for this component.
    ///
    /// The service shares state with the component and can be handed to the
    /// server before the component is started.
    pub fn service(&self) -> CompletionService {
        CompletionService {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Component for CompletionComponent {
    fn name(&self) -> &'static str {
        "completion"
    }

    async fn start(&mut self, handle: DaemonHandle) -> Result<()> {
        *self.inner.handle.write().await = Some(handle);

        // Sweep expired cache entries in the background.
        let inner = self.inner.clone();
        self.sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = inner.cache.remove_expired(inner.cache_ttl);
                if removed > 0 {
                    tracing::trace!(removed, "swept expired completion cache entries");
                }
            }
        }));

        tracing::info!("completion component started");
        Ok(())
    }

    async fn handle_event(&mut self, event: &DaemonEvent) -> Result<()> {
        match event {
            DaemonEvent::CommandRecorded(entry) if entry.success => {
                // Positive signal: bump the accepted completion in the cached
                // list for the context it was accepted from.
                let tokens: Vec<&str> = entry.command_line.split_whitespace().collect();
                if let Some((last, context)) = tokens.split_last() {
                    let key = cache_key(&entry.command, context.iter().copied().skip(1));
                    self.inner.cache.increment_usage(&key, last);
                }
            }
            DaemonEvent::CacheCleared => {
                self.inner.cache.clear();
            }
            _ => {}
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
        tracing::info!("completion component stopped");
        Ok(())
    }
}

/// The IPC service implementation.
///
/// A thin wrapper that shares state with the component.
#[derive(Clone)]
pub struct CompletionService {
    inner: Arc<CompletionInner>,
}

impl CompletionService {
    /// Answer a completion request.
    ///
    /// The response always carries the full context list; filtering by the
    /// partial word happens client-side.
    pub async fn complete(&self, request: CompletionRequest) -> CompletionResponse {
        let context = context_tokens(&request.command_line, &request.word_to_complete);
        let key = cache_key(&request.command, context.iter().map(String::as_str));

        if let Some(items) = self.inner.cache.try_get(&key) {
            tracing::debug!(%key, "completion cache hit");
            return make_response(items, true);
        }

        let context_line = if context.is_empty() {
            format!("{} ", request.command)
        } else {
            format!("{} {} ", request.command, context.join(" "))
        };

        let known = self.inner.catalog.completions(
            &context_line,
            "",
            request.include_dynamic_arguments,
        );

        let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        let learned = self
            .inner
            .predictor
            .suggest(&context_line, &cwd, &CancelFlag::new());
        let workflow = self.inner.predictor.workflow_suggestions();

        let fused = fusion::fuse(&known, learned, workflow, &self.inner.fusion);
        self.inner.cache.set(&key, fused.clone());

        tracing::debug!(%key, results = fused.len(), "generated completions");
        make_response(fused, false)
    }

    /// Answer a debug request.
    pub async fn debug(&self, request: DebugRequest) -> DebugResponse {
        match request.request_type {
            DebugRequestType::Ping => DebugResponse {
                success: true,
                message: Some("pong".to_string()),
                ..Default::default()
            },
            DebugRequestType::Stats => {
                let stats = self.inner.predictor.stores().stats();
                let cache = self.inner.cache.stats();
                DebugResponse {
                    success: true,
                    stats: Some(DebugStats {
                        commands: stats.knowledge.commands,
                        arguments: stats.knowledge.arguments,
                        history_entries: stats.history.len,
                        sequence_transitions: stats.sequences.transitions,
                        workflow_transitions: stats.workflows.transitions,
                        cache_entries: cache.entries,
                        cache_hits: cache.total_hits,
                    }),
                    ..Default::default()
                }
            }
            DebugRequestType::Cache => {
                let filter = request.filter.unwrap_or_default().to_lowercase();
                let entries: Vec<DebugCacheEntry> = self
                    .inner
                    .cache
                    .entries_summary()
                    .into_iter()
                    .filter(|entry| filter.is_empty() || entry.key.contains(&filter))
                    .map(|entry| DebugCacheEntry {
                        key: entry.key,
                        items: entry.items,
                        hits: entry.hits,
                        age_seconds: entry.age_seconds,
                    })
                    .collect();
                DebugResponse {
                    success: true,
                    cache_entries: Some(entries),
                    ..Default::default()
                }
            }
            DebugRequestType::Clear => {
                self.inner.cache.clear();
                if let Some(handle) = self.inner.handle.read().await.as_ref() {
                    handle.emit(DaemonEvent::CacheCleared);
                }
                DebugResponse {
                    success: true,
                    message: Some("caches cleared".to_string()),
                    ..Default::default()
                }
            }
        }
    }
}

/// Tokens of the command line minus the command itself and the word being
/// completed.
fn context_tokens(command_line: &str, word_to_complete: &str) -> Vec<String> {
    let mut tokens: Vec<String> = command_line
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect();
    if !word_to_complete.is_empty() {
        if let Some(last) = tokens.last() {
            if last.eq_ignore_ascii_case(word_to_complete) {
                tokens.pop();
            }
        }
    }
    tokens
}

/// Cache key: `command | context tokens joined by '|'`, lowercased.
fn cache_key<'a>(command: &str, context: impl Iterator<Item = &'a str>) -> String {
    let mut key = command.to_lowercase();
    for token in context {
        key.push('|');
        key.push_str(&token.to_lowercase());
    }
    key
}

fn make_response(
    items: Vec<pscue_client::suggestion::Suggestion>,
    cached: bool,
) -> CompletionResponse {
    CompletionResponse {
        completions: items.into_iter().map(Into::into).collect(),
        cached,
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn context_excludes_partial_word() {
        assert_eq!(
            context_tokens("git commit -m", "-m"),
            vec!["commit".to_string()]
        );
        assert_eq!(
            context_tokens("git commit ", ""),
            vec!["commit".to_string()]
        );
        assert!(context_tokens("git", "").is_empty());
    }

    #[test]
    fn cache_key_shape() {
        let tokens = context_tokens("Git Commit -m", "-m");
        let key = cache_key("Git", tokens.iter().map(String::as_str));
        assert_eq!(key, "git|commit");
    }
}
