//! Fuzzy matching for directory names.

use super::MatchKind;

/// Fuzzy scores never reach prefix-match territory.
const FUZZY_CAP: f64 = 0.89;

/// Longest common subsequence length, in characters.
fn lcs_len(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];

    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Score `candidate` against the user's partial `query`.
///
/// Exact beats prefix beats substring beats edit-distance similarity.
/// Substring matches decay with position; edit-distance matches must clear
/// `min_match_pct`, and long queries additionally need a common-subsequence
/// overlap so unrelated names with a lucky distance don't sneak in.
pub fn match_score(query: &str, candidate: &str, min_match_pct: f64) -> Option<(f64, MatchKind)> {
    let q = query.to_lowercase();
    let c = candidate.to_lowercase();

    if q.is_empty() {
        return Some((0.0, MatchKind::Learned));
    }
    if c == q {
        return Some((1.0, MatchKind::Exact));
    }
    if c.starts_with(&q) {
        return Some((0.9, MatchKind::Prefix));
    }
    if let Some(index) = c.find(&q) {
        let positional = 1.0 - index as f64 / c.len() as f64;
        return Some((0.7 * positional, MatchKind::Fuzzy));
    }

    let similarity = strsim::normalized_levenshtein(&q, &c);
    if similarity < min_match_pct {
        return None;
    }
    if q.chars().count() > 10 {
        let overlap = lcs_len(&q, &c) as f64 / q.chars().count() as f64;
        if overlap < 0.6 {
            return None;
        }
    }

    Some((similarity.min(FUZZY_CAP), MatchKind::Fuzzy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix() {
        assert_eq!(match_score("alpha", "Alpha", 0.7).unwrap().0, 1.0);
        assert_eq!(
            match_score("alph", "alpha", 0.7).unwrap(),
            (0.9, MatchKind::Prefix)
        );
    }

    #[test]
    fn substring_decays_with_position() {
        let (early, _) = match_score("pro", "my-projects", 0.7).unwrap();
        let (late, _) = match_score("ect", "my-projects", 0.7).unwrap();
        assert!(early > late);
        assert!(early <= 0.7);
    }

    #[test]
    fn levenshtein_needs_min_similarity() {
        // one edit away
        assert!(match_score("alhpa", "alpha", 0.5).is_some());
        // nothing in common
        assert!(match_score("zzzz", "alpha", 0.7).is_none());
    }

    #[test]
    fn long_queries_need_subsequence_overlap() {
        // 11+ chars, similar length but low real overlap
        assert!(match_score("abcdefghijk", "axbxcxdxexf", 0.0).is_none());
    }

    #[test]
    fn fuzzy_stays_below_prefix() {
        if let Some((score, kind)) = match_score("alpah", "alpha", 0.5) {
            assert!(score < 0.9);
            assert_eq!(kind, MatchKind::Fuzzy);
        }
    }

    #[test]
    fn lcs_basics() {
        assert_eq!(lcs_len("abc", "abc"), 3);
        assert_eq!(lcs_len("abc", "axbxc"), 3);
        assert_eq!(lcs_len("abc", "xyz"), 0);
    }
}
