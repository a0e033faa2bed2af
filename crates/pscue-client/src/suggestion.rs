use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Where a suggestion came from.
///
/// Prediction sources used to be an interface hierarchy in older designs;
/// here they collapse to a tag carried on each suggestion so rank fusion can
/// apply per-stream boosts without dynamic dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Known,
    Learned,
    Sequence,
    Workflow,
    Directory,
}

/// A single ranked completion candidate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub description: String,
    pub score: f64,
    pub source: SuggestionSource,
}

impl Suggestion {
    pub fn new(
        text: impl Into<String>,
        description: impl Into<String>,
        score: f64,
        source: SuggestionSource,
    ) -> Self {
        Self {
            text: text.into(),
            description: description.into(),
            score,
            source,
        }
    }
}

/// Cooperative cancellation for the suggestion path.
///
/// The prediction pipeline checks this between stages and returns the best
/// result so far once it flips. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Compact "how long ago" phrasing for tooltips: "just now", "5m ago",
/// "3h ago", "2d ago".
pub fn format_age(last_used: OffsetDateTime, now: OffsetDateTime) -> String {
    let seconds = (now - last_used).whole_seconds().max(0);
    match seconds {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", seconds / 60),
        3_600..=86_399 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn age_phrasing() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2d ago");
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
