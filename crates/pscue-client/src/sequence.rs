//! Sequence predictor.
//!
//! Learns bigram command transitions (`prev -> next`) and predicts the next
//! command from recent history. Scores blend transition probability with
//! exponential recency decay, gated by a minimum observed frequency.

use std::collections::HashMap;

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::settings::Settings;

#[derive(Clone, Copy, Debug)]
pub struct NgramEntry {
    pub frequency: u64,
    pub last_seen: OffsetDateTime,
}

#[derive(Clone, Copy, Debug)]
pub struct SequenceStats {
    pub sources: usize,
    pub transitions: usize,
}

/// N-gram next-command predictor.
pub struct SequencePredictor {
    /// prev command -> (next command -> entry)
    transitions: DashMap<String, HashMap<String, NgramEntry>>,
    /// Frequency accumulated since the last save.
    deltas: DashMap<String, HashMap<String, u64>>,
    enabled: bool,
    order: usize,
    min_frequency: u64,
    max_predictions: usize,
    decay_days: f64,
}

impl SequencePredictor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            transitions: DashMap::new(),
            deltas: DashMap::new(),
            enabled: settings.ml_enabled && !settings.disable_learning,
            order: settings.ml_ngram_order.max(2),
            min_frequency: settings.ml_ngram_min_freq,
            max_predictions: settings.ml_max_predictions,
            decay_days: settings.decay_days,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record that `next` was executed right after `prev`.
    pub fn record_transition(&self, prev: &str, next: &str, at: OffsetDateTime) {
        if !self.enabled || prev.is_empty() || next.is_empty() {
            return;
        }

        let prev_key = prev.to_lowercase();
        let next_key = next.to_lowercase();

        {
            let mut entry = self.transitions.entry(prev_key.clone()).or_default();
            let ngram = entry.entry(next_key.clone()).or_insert(NgramEntry {
                frequency: 0,
                last_seen: at,
            });
            ngram.frequency += 1;
            if at > ngram.last_seen {
                ngram.last_seen = at;
            }
        }

        *self
            .deltas
            .entry(prev_key)
            .or_default()
            .entry(next_key)
            .or_insert(0) += 1;
    }

    /// Predict likely next commands given recent history, newest first.
    ///
    /// Looks at up to `order - 1` recent commands; older positions contribute
    /// with halved weight each step back.
    pub fn predict(&self, recent: &[String]) -> Vec<(String, f64)> {
        if !self.enabled {
            return Vec::new();
        }

        let now = OffsetDateTime::now_utc();
        let mut scores: HashMap<String, f64> = HashMap::new();

        let lookback = (self.order - 1).max(1);
        for (position, prev) in recent.iter().take(lookback).enumerate() {
            let weight = 0.5_f64.powi(position as i32);
            let Some(nexts) = self.transitions.get(&prev.to_lowercase()) else {
                continue;
            };
            let total: u64 = nexts.values().map(|entry| entry.frequency).sum();
            if total == 0 {
                continue;
            }
            for (next, entry) in nexts.iter() {
                if entry.frequency < self.min_frequency {
                    continue;
                }
                let probability = entry.frequency as f64 / total as f64;
                let age_days = ((now - entry.last_seen).as_seconds_f64() / 86_400.0).max(0.0);
                let recency = (-age_days / self.decay_days).exp().min(1.0);
                let score = weight * (0.7 * probability + 0.3 * recency);
                let slot = scores.entry(next.clone()).or_insert(0.0);
                if score > *slot {
                    *slot = score;
                }
            }
        }

        let mut results: Vec<(String, f64)> = scores.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(self.max_predictions);
        results
    }

    pub fn stats(&self) -> SequenceStats {
        SequenceStats {
            sources: self.transitions.len(),
            transitions: self.transitions.iter().map(|entry| entry.len()).sum(),
        }
    }

    pub fn clear(&self) {
        self.transitions.clear();
        self.deltas.clear();
    }

    // ---- Persistence support ----

    /// `(prev, next, frequency_delta, last_seen)` accumulated since last save.
    pub fn snapshot_deltas(&self) -> Vec<(String, String, u64, OffsetDateTime)> {
        let mut out = Vec::new();
        for entry in self.deltas.iter() {
            let prev = entry.key();
            for (next, delta) in entry.iter() {
                if *delta == 0 {
                    continue;
                }
                let last_seen = self
                    .transitions
                    .get(prev)
                    .and_then(|nexts| nexts.get(next).map(|n| n.last_seen))
                    .unwrap_or_else(OffsetDateTime::now_utc);
                out.push((prev.clone(), next.clone(), *delta, last_seen));
            }
        }
        out
    }

    /// Called after a confirmed save.
    pub fn clear_deltas(&self) {
        self.deltas.clear();
    }

    /// Install persisted state without generating a delta.
    pub fn initialize_transition(
        &self,
        prev: &str,
        next: &str,
        frequency: u64,
        last_seen: OffsetDateTime,
    ) {
        let mut entry = self.transitions.entry(prev.to_lowercase()).or_default();
        entry.insert(
            next.to_lowercase(),
            NgramEntry {
                frequency,
                last_seen,
            },
        );
    }
}
