//! Partial-ratio string similarity.
//!
//! Scores how well the shorter string lines up with its best-matching
//! stretch of the longer one, so extra words around a name do not hurt the
//! score. Each alignment is scored with the normalized Indel similarity
//! `200 * LCS / (len_a + len_b)`, giving a value in `[0, 100]`.

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Full-string similarity in `[0, 100]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    indel_ratio(&a, &b)
}

/// Best similarity between the shorter string and any window of the longer
/// one. Windows are the full-length slices plus the shorter slices hanging
/// off either end. Scores 0 when either side is empty.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let (n, m) = (short.len(), long.len());

    if long.windows(n).any(|w| w == short.as_slice()) {
        return 100.0;
    }

    let mut best = 0.0f64;
    for window in long.windows(n) {
        best = best.max(indel_ratio(&short, window));
    }
    for k in 1..n.min(m + 1) {
        best = best.max(indel_ratio(&short, &long[..k]));
        best = best.max(indel_ratio(&short, &long[m - k..]));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", "abc"), 100.0);
        assert_eq!(ratio("abcd", "abed"), 75.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_partial_ratio_substring_is_perfect() {
        assert_eq!(partial_ratio("pet simulator x", "pet simulator x new update!"), 100.0);
        // Symmetric in argument order
        assert_eq!(partial_ratio("pet simulator x new update!", "pet simulator x"), 100.0);
    }

    #[test]
    fn test_partial_ratio_best_window() {
        // Best window is "abed": LCS 3 of 4
        assert_eq!(partial_ratio("abcd", "xabed"), 75.0);

        let near = partial_ratio("pet simulator x", "pet simulater x update");
        assert!(near >= 82.0 && near < 100.0, "score was {}", near);
    }

    #[test]
    fn test_partial_ratio_unrelated_and_empty() {
        assert!(partial_ratio("blox fruits", "random gaming video") < 82.0);
        assert_eq!(partial_ratio("", "anything"), 0.0);
        assert_eq!(partial_ratio("anything", ""), 0.0);
    }

    #[test]
    fn test_partial_ratio_is_deterministic() {
        let first = partial_ratio("adopt me", "new adpot me secret code");
        for _ in 0..10 {
            assert_eq!(partial_ratio("adopt me", "new adpot me secret code"), first);
        }
    }
}
