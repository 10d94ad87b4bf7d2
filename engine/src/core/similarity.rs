//! Ratcliff/Obershelp similarity and fuzzy line replacement.

use crate::core::edit::{EditError, EditOutcome, TextBuffer, block_lines};

/// Default minimum similarity for [`replace_fuzzy`].
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Similarity ratio `2 * M / (len(a) + len(b))` in `0.0..=1.0`, where `M` is
/// the number of characters in the recursively found longest common blocks.
///
/// Two empty strings are identical (ratio 1.0).
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties resolve to the earliest start in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in alo..ahi {
        let mut cur = vec![0usize; b.len() + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j] + 1;
                cur[j + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = cur;
    }
    best
}

/// Replace the single line most similar to `target` with `replacement`.
///
/// Nothing changes unless the best score reaches `threshold`; the error
/// carries the best score found.
pub fn replace_fuzzy(
    content: &str,
    target: &str,
    replacement: &str,
    threshold: f64,
) -> Result<EditOutcome, EditError> {
    if target.is_empty() {
        return Err(EditError::EmptyNeedle);
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EditError::InvalidThreshold(threshold));
    }
    let mut buf = TextBuffer::parse(content);

    let mut best: Option<(usize, f64)> = None;
    for (idx, line) in buf.lines.iter().enumerate() {
        let score = ratio(line, target);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((idx, score));
        }
    }

    match best {
        Some((idx, score)) if score >= threshold => {
            buf.lines.splice(idx..=idx, block_lines(replacement));
            Ok(EditOutcome::new(buf.render(), "replaced line by fuzzy match")
                .with("line_number", idx + 1)
                .with("similarity", score))
        }
        other => Err(EditError::BelowThreshold {
            best: other.map_or(0.0, |(_, score)| score),
            threshold,
            line: other.map(|(idx, _)| idx + 1),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ratio_matches_reference_values() {
        assert!(close(ratio("abcd", "bcde"), 0.75));
        assert!(close(ratio("", ""), 1.0));
        assert!(close(ratio("abc", ""), 0.0));
        assert!(close(ratio("same", "same"), 1.0));
        // "qabxcd" vs "abycdf": blocks "ab" and "cd".
        assert!(close(ratio("qabxcd", "abycdf"), 8.0 / 12.0));
    }

    #[test]
    fn fuzzy_replaces_best_line() {
        let doc = "let x = 1;\nlet total = compute();\nreturn total;\n";
        let out = replace_fuzzy(doc, "let totl = compute()", "let total = recompute();", 0.6)
            .expect("fuzzy");
        assert_eq!(out.content, "let x = 1;\nlet total = recompute();\nreturn total;\n");
        assert_eq!(out.details["line_number"], 2);
    }

    #[test]
    fn fuzzy_below_threshold_reports_score_and_keeps_content() {
        let doc = "alpha\nbeta\n";
        let err = replace_fuzzy(doc, "zzzzzzzz", "x", 0.6).expect_err("below threshold");
        match err {
            EditError::BelowThreshold { best, threshold, .. } => {
                assert!(best < 0.6);
                assert!(close(threshold, 0.6));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn fuzzy_on_empty_document_fails() {
        assert!(matches!(
            replace_fuzzy("", "x", "y", 0.1),
            Err(EditError::BelowThreshold { line: None, .. })
        ));
    }

    #[test]
    fn first_line_wins_ties() {
        let out = replace_fuzzy("dup\ndup\n", "dup", "one", 0.5).expect("fuzzy");
        assert_eq!(out.content, "one\ndup\n");
    }
}
