//! Text normalization for extracted question text.
//!
//! Cleans up reader output before line classification: strips control
//! characters, folds compatibility forms (ligatures, full-width digits),
//! collapses whitespace, and repairs question numbering that OCR layers
//! commonly garble.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Regex to collapse multiple whitespace characters into one.
/// Vertical tabs and form feeds count as whitespace.
static WHITESPACE_COLLAPSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C\u{a0}]+").unwrap());

/// Numbers followed by a character OCR confuses with a period: "1o ", "1l ", "1, ".
static MISREAD_PERIOD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})[oOl,](\s)").unwrap());

/// A period glued to the first letter of the question: "1.What".
static GLUED_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.(\p{L})").unwrap());

/// Text normalizer for question documents.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    /// Whether to repair misread question numbering at line start.
    repair_numbering: bool,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    /// Create a new text normalizer with numbering repair enabled.
    pub fn new() -> Self {
        Self {
            repair_numbering: true,
        }
    }

    /// Set whether to repair misread question numbering.
    pub fn with_repair_numbering(mut self, repair: bool) -> Self {
        self.repair_numbering = repair;
        self
    }

    /// Normalize a single line of text.
    ///
    /// - Removes NUL and other C0 control characters
    /// - Applies Unicode NFKC (ligatures, full-width digits and letters)
    /// - Collapses whitespace runs to single spaces
    /// - Trims leading/trailing whitespace
    /// - Optionally repairs numbering such as "1o " or "1.What"
    pub fn normalize_line(&self, text: &str) -> String {
        let cleaned: String = text
            .chars()
            .filter(|&c| c >= ' ' || matches!(c, '\t' | '\x0B' | '\x0C'))
            .nfkc()
            .collect();
        let collapsed = WHITESPACE_COLLAPSE_REGEX.replace_all(&cleaned, " ");
        let mut result = collapsed.trim().to_string();

        if self.repair_numbering {
            result = MISREAD_PERIOD_REGEX.replace(&result, "$1.$2").into_owned();
            result = GLUED_NUMBER_REGEX.replace(&result, "$1. $2").into_owned();
        }

        result
    }

    /// Normalize a block of text, returning its non-empty lines.
    pub fn normalize_to_lines(&self, text: &str) -> Vec<String> {
        text.replace("\r\n", "\n")
            .replace('\r', "\n")
            .lines()
            .map(|l| self.normalize_line(l))
            .filter(|l| !l.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_nul_and_trim() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize_line("\0  What is\0 this? "), "What is this?");
    }

    #[test]
    fn test_control_characters() {
        let normalizer = TextNormalizer::new();

        assert_eq!(
            normalizer.normalize_line("What is shown\x0Con the next page?"),
            "What is shown on the next page?"
        );
        assert_eq!(normalizer.normalize_line("x\x0By"), "x y");
        assert_eq!(normalizer.normalize_line("\x0C1. Bell\x07 and\x1B esc"), "1. Bell and esc");
    }

    #[test]
    fn test_collapse_whitespace() {
        let normalizer = TextNormalizer::new();

        assert_eq!(normalizer.normalize_line("Hello    world"), "Hello world");
        assert_eq!(normalizer.normalize_line("\t\tHello\t\t"), "Hello");
        assert_eq!(normalizer.normalize_line("A.\u{a0}\u{a0}3"), "A. 3");
    }

    #[test]
    fn test_nfkc_folds_ligatures_and_fullwidth() {
        let normalizer = TextNormalizer::new();

        assert_eq!(normalizer.normalize_line("de\u{fb01}ne"), "define");
        assert_eq!(normalizer.normalize_line("\u{ff11}\u{ff0e} Which"), "1. Which");
    }

    #[test]
    fn test_repair_misread_periods() {
        let normalizer = TextNormalizer::new();

        assert_eq!(normalizer.normalize_line("1o What is"), "1. What is");
        assert_eq!(normalizer.normalize_line("12l Which"), "12. Which");
        assert_eq!(normalizer.normalize_line("3, Name the"), "3. Name the");
    }

    #[test]
    fn test_repair_glued_number() {
        let normalizer = TextNormalizer::new();

        assert_eq!(normalizer.normalize_line("1.What is"), "1. What is");
        // Decimals are left alone
        assert_eq!(normalizer.normalize_line("3.14 is pi"), "3.14 is pi");
    }

    #[test]
    fn test_repair_only_at_line_start() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize_line("Add 1o and 2, then"),
            "Add 1o and 2, then"
        );
    }

    #[test]
    fn test_repair_disabled() {
        let normalizer = TextNormalizer::new().with_repair_numbering(false);
        assert_eq!(normalizer.normalize_line("1o What"), "1o What");
        assert_eq!(normalizer.normalize_line("1.What"), "1.What");
    }

    #[test]
    fn test_normalize_to_lines_filters_empty() {
        let normalizer = TextNormalizer::new();

        let lines = normalizer.normalize_to_lines("1. Hello\r\n\r\n  \nA. World\rB. Again");
        assert_eq!(lines, vec!["1. Hello", "A. World", "B. Again"]);
    }
}
