//! Trigram string similarity for recovering mistyped tracking codes.
//!
//! Each alphanumeric word is padded with two leading spaces and one trailing
//! space before its three-character windows are collected; similarity is the
//! Jaccard ratio of the two trigram sets. `fb_summer24` and `fb_sumer24`
//! score ~0.77, unrelated codes score near zero.

use std::collections::BTreeSet;

/// Trigram set of a string. Case-insensitive; punctuation separates words.
pub fn trigrams(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    let mut grams = BTreeSet::new();
    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

/// Jaccard similarity of two precomputed trigram sets, in `[0, 1]`.
pub fn set_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

pub fn similarity(a: &str, b: &str) -> f64 {
    set_similarity(&trigrams(a), &trigrams(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_score_one() {
        assert!((similarity("sms_gotv", "SMS_GOTV") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_typo_stays_above_threshold() {
        let score = similarity("fb_summer24", "fb_sumer24");
        assert!(score > 0.6, "score was {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn test_unrelated_codes_score_low() {
        assert!(similarity("fb_summer24", "email_blast_oct") < 0.2);
    }

    #[test]
    fn test_empty_or_punctuation_only_scores_zero() {
        assert_eq!(similarity("", "fb_summer24"), 0.0);
        assert_eq!(similarity("___", "---"), 0.0);
    }

    #[test]
    fn test_word_padding() {
        let grams = trigrams("ab");
        assert!(grams.contains("  a"));
        assert!(grams.contains(" ab"));
        assert!(grams.contains("ab "));
        assert_eq!(grams.len(), 3);
    }
}
