//! Scoring for learned directory suggestions.

use std::path::Path;

/// Weights for the learned-directory score terms.
#[derive(Clone, Copy, Debug)]
pub struct ScoreWeights {
    pub frequency: f64,
    pub recency: f64,
    pub distance: f64,
    pub exact_match_boost: f64,
}

/// Combined score for a learned directory.
///
/// The match term is scaled down so frequency/recency/distance dominate for
/// weak matches, while an exact match gets the full configured boost.
pub fn learned_score(
    match_score: f64,
    exact: bool,
    freq_score: f64,
    rec_score: f64,
    dist_score: f64,
    weights: &ScoreWeights,
) -> f64 {
    let boost = if exact { weights.exact_match_boost } else { 1.0 };
    match_score * 0.1 * boost
        + weights.frequency * freq_score
        + weights.recency * rec_score
        + weights.distance * dist_score
}

/// How related `path` is to the current directory.
///
/// Same directory scores highest, then parent, then children (fading with
/// depth), siblings, ancestors (fading with distance), and finally anything
/// else.
pub fn distance_score(path: &Path, cwd: &Path) -> f64 {
    if path == cwd {
        return 1.0;
    }
    if cwd.parent() == Some(path) {
        return 0.9;
    }
    if let Ok(rest) = path.strip_prefix(cwd) {
        let below = rest.components().count();
        return (0.85 - 0.1 * below.saturating_sub(1) as f64).max(0.1);
    }
    if path.parent().is_some() && path.parent() == cwd.parent() {
        return 0.7;
    }
    if cwd.strip_prefix(path).is_ok() {
        let cwd_depth = cwd.components().count();
        let common = path.components().count();
        return (0.6 - 0.05 * (cwd_depth - common) as f64).max(0.1);
    }
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn weights() -> ScoreWeights {
        ScoreWeights {
            frequency: 0.5,
            recency: 0.3,
            distance: 0.2,
            exact_match_boost: 100.0,
        }
    }

    #[test]
    fn exact_match_dominates() {
        let exact = learned_score(1.0, true, 0.1, 0.1, 0.1, &weights());
        let partial = learned_score(0.9, false, 1.0, 1.0, 1.0, &weights());
        assert!(exact > partial);
    }

    #[test]
    fn distance_ordering() {
        let cwd = PathBuf::from("/home/user/projects");

        let same = distance_score(&cwd, &cwd);
        let parent = distance_score(Path::new("/home/user"), &cwd);
        let child = distance_score(Path::new("/home/user/projects/alpha"), &cwd);
        let deep_child = distance_score(Path::new("/home/user/projects/alpha/src"), &cwd);
        let sibling = distance_score(Path::new("/home/user/downloads"), &cwd);
        let ancestor = distance_score(Path::new("/home"), &cwd);
        let other = distance_score(Path::new("/var/log"), &cwd);

        assert_eq!(same, 1.0);
        assert_eq!(parent, 0.9);
        assert_eq!(child, 0.85);
        assert!(deep_child < child);
        assert_eq!(sibling, 0.7);
        assert!(ancestor < sibling);
        assert_eq!(other, 0.1);
    }
}
