//! Orthographic normalization for Latin surface forms.
//!
//! Latin text reaches the pipeline in wildly inconsistent orthography:
//! school editions mark vowel length with macrons (`rosā`), editors disagree
//! on `u`/`v` (`seruus` vs `servus`) and `i`/`j` (`iam` vs `jam`), and
//! capitalisation follows the source, not the dictionary. [`normalize`]
//! collapses all of that into a single comparison key so that lookups and
//! duplicate detection see one word where a reader sees several spellings.
//!
//! The function is pure, total, and idempotent: applying it twice yields
//! the same key, and the empty string maps to the empty key.
//!
//! ```rust
//! use lectio_norm::normalize;
//!
//! assert_eq!(normalize("rosā"), "rosa");
//! assert_eq!(normalize("seruus"), normalize("Servus"));
//! assert_eq!(normalize("Jam"), normalize("iam"));
//! ```

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Compute the comparison key for a surface form.
///
/// Steps, in order: NFD-decompose and drop combining marks (macrons,
/// breves), lowercase, fold `v` → `u` and `j` → `i`. The two letter folds
/// run after lowercasing so `V`/`J` are covered by the same arm.
pub fn normalize(surface: &str) -> String {
    surface
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'v' => 'u',
            'j' => 'i',
            other => other,
        })
        .collect()
}

/// Whether a token counts as a word for linking purposes.
///
/// Mirrors the analyzer's alphabetic test: anything with at least one
/// alphabetic character is a word; pure punctuation and digit runs are not.
pub fn is_word(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_macrons() {
        assert_eq!(normalize("rosā"), "rosa");
        assert_eq!(normalize("īnsula"), "insula");
        assert_eq!(normalize("puellae"), "puellae");
    }

    #[test]
    fn folds_orthographic_variants() {
        assert_eq!(normalize("seruus"), "seruus");
        assert_eq!(normalize("servus"), "seruus");
        assert_eq!(normalize("Jam"), "iam");
        assert_eq!(normalize("iam"), "iam");
        assert_eq!(normalize("Venio"), "uenio");
    }

    #[test]
    fn idempotent_and_total() {
        for s in ["rosā", "SERVVS", "jām", "", "123", "SPQR."] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn word_test_requires_a_letter() {
        assert!(is_word("rosa"));
        assert!(is_word("Rōmae"));
        assert!(!is_word("."));
        assert!(!is_word("—"));
        assert!(!is_word("42"));
        assert!(is_word("IIIviri"));
    }
}
