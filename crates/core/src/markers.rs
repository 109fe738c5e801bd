//! Question and option marker recognition.
//!
//! A line is classified as the start of a question ("1.", "Q2)", "(3)"),
//! one or more answer options ("A.", "(B)"), or plain text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static DOTTED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.(?:\s+(.*)|([^\d\s.].*))?$").unwrap());

static PARENTHESIZED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\)\s*(.*)$").unwrap());

static ENCLOSED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((\d{1,3})\)\s*(.*)$").unwrap());

static PREFIXED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[Qq]\.?\s?(\d{1,3})(?:[.):]\s*|\s+|$)(.*)$").unwrap()
});

static WORDED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^question\s*(?:no\.?\s*)?(\d{1,3})(?:[.):\-]\s*|\s+|$)(.*)$").unwrap()
});

static DASHED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\s*[-\u{2013}\u{2014}](?:\s+(.*)|([^\d\s].*))?$").unwrap()
});

/// An option marker at the start of a line: "A.", "A)", "A:", "(A)", "a)", "(a)".
static OPTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\(([A-Ea-e])\)\s*|([A-E])[.):](?:\s+|$)|([a-e])[.)](?:\s+|$))(.*)$").unwrap()
});

/// An option marker inside a line, used to split "A. 3  B. 4  C. 5".
static INLINE_OPTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s(?:\(([A-Ea-e])\)|([A-E])[.):]|([a-e])\))\s+").unwrap()
});

/// A family of question-number syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStyle {
    /// "1. Question"
    Dotted,
    /// "1) Question"
    Parenthesized,
    /// "(1) Question"
    Enclosed,
    /// "Q1. Question", "Q1 Question"
    Prefixed,
    /// "Question 1. Text"
    Worded,
    /// "1- Question", "1 – Question"
    Dashed,
}

impl MarkerStyle {
    /// All styles, in tie-break order for automatic detection.
    pub const ALL: [MarkerStyle; 6] = [
        MarkerStyle::Dotted,
        MarkerStyle::Prefixed,
        MarkerStyle::Parenthesized,
        MarkerStyle::Enclosed,
        MarkerStyle::Worded,
        MarkerStyle::Dashed,
    ];

    fn regex(&self) -> &'static Regex {
        match self {
            Self::Dotted => &DOTTED_REGEX,
            Self::Parenthesized => &PARENTHESIZED_REGEX,
            Self::Enclosed => &ENCLOSED_REGEX,
            Self::Prefixed => &PREFIXED_REGEX,
            Self::Worded => &WORDED_REGEX,
            Self::Dashed => &DASHED_REGEX,
        }
    }

    /// Parse a question marker of this style, returning the number and the
    /// remaining text.
    pub fn parse(&self, line: &str) -> Option<(u32, String)> {
        let caps = self.regex().captures(line)?;
        let number = caps.get(1)?.as_str().parse().ok()?;
        let text = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        Some((number, text))
    }

    /// Whether the line starts with a question marker of this style.
    pub fn matches(&self, line: &str) -> bool {
        self.regex().is_match(line)
    }
}

/// Which marker styles count as question starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerMode {
    /// Use the style that matches the most lines in the document.
    #[default]
    Auto,
    /// Accept every style.
    Any,
    /// Accept only the given style.
    Only(MarkerStyle),
}

/// An answer option found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    /// Uppercase option letter.
    pub letter: char,
    /// Option text with the marker removed.
    pub text: String,
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// A question marker with its number and trailing text.
    Question { number: u32, text: String },
    /// One or more answer options (several when given inline).
    Options(Vec<AnswerOption>),
    /// Anything else.
    Text(String),
}

/// Pick the marker style matching the most lines.
///
/// Ties go to the style listed first in [`MarkerStyle::ALL`]. Returns
/// `None` when no line carries any question marker.
pub fn detect_style<'a, I>(lines: I) -> Option<MarkerStyle>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = [0usize; MarkerStyle::ALL.len()];

    for line in lines {
        for (idx, style) in MarkerStyle::ALL.iter().enumerate() {
            if style.matches(line) {
                counts[idx] += 1;
            }
        }
    }

    let mut best: Option<(MarkerStyle, usize)> = None;
    for (style, &count) in MarkerStyle::ALL.iter().zip(counts.iter()) {
        if count == 0 {
            continue;
        }
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((*style, count)),
        }
    }

    if let Some((style, count)) = best {
        log::debug!("Detected question marker style {:?} ({} lines)", style, count);
    }

    best.map(|(style, _)| style)
}

/// Line classifier configured with a set of question marker styles.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    styles: Vec<MarkerStyle>,
    split_inline_options: bool,
}

impl LineClassifier {
    /// Create a classifier accepting the given styles.
    pub fn new(styles: Vec<MarkerStyle>) -> Self {
        Self {
            styles,
            split_inline_options: true,
        }
    }

    /// Create a classifier for a marker mode, resolving `Auto` against the
    /// document's lines.
    pub fn for_mode<'a, I>(mode: MarkerMode, lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let styles = match mode {
            MarkerMode::Any => MarkerStyle::ALL.to_vec(),
            MarkerMode::Only(style) => vec![style],
            MarkerMode::Auto => match detect_style(lines) {
                Some(style) => vec![style],
                None => MarkerStyle::ALL.to_vec(),
            },
        };
        Self::new(styles)
    }

    /// Set whether "A. x  B. y" on one line is split into separate options.
    pub fn with_split_inline_options(mut self, split: bool) -> Self {
        self.split_inline_options = split;
        self
    }

    /// Styles accepted as question markers.
    pub fn styles(&self) -> &[MarkerStyle] {
        &self.styles
    }

    /// Classify a normalized line.
    pub fn classify(&self, line: &str) -> LineKind {
        let line = line.trim();

        for style in &self.styles {
            if let Some((number, text)) = style.parse(line) {
                return LineKind::Question { number, text };
            }
        }

        if let Some(caps) = OPTION_REGEX.captures(line) {
            let letter = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .and_then(|m| m.as_str().chars().next())
                .map(|c| c.to_ascii_uppercase());
            let text = caps.get(4).map(|m| m.as_str()).unwrap_or_default();

            if let Some(letter) = letter {
                let options = if self.split_inline_options {
                    split_inline_options(letter, text)
                } else {
                    vec![AnswerOption {
                        letter,
                        text: text.trim().to_string(),
                    }]
                };
                return LineKind::Options(options);
            }
        }

        LineKind::Text(line.to_string())
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(MarkerStyle::ALL.to_vec())
    }
}

fn next_letter(letter: char) -> Option<char> {
    match letter {
        'A'..='D' => char::from_u32(letter as u32 + 1),
        _ => None,
    }
}

/// Split option text that carries further options inline.
///
/// A marker only splits when its letter continues the sequence, so
/// "A. Vitamin C. deficiency" stays one option.
fn split_inline_options(first: char, text: &str) -> Vec<AnswerOption> {
    let mut options = Vec::new();
    let mut current = first;
    let mut expected = next_letter(first);
    let mut start = 0;

    for caps in INLINE_OPTION_REGEX.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let letter = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .and_then(|m| m.as_str().chars().next())
            .map(|c| c.to_ascii_uppercase());

        if letter.is_none() || letter != expected {
            continue;
        }

        options.push(AnswerOption {
            letter: current,
            text: text[start..whole.start()].trim().to_string(),
        });
        current = letter.unwrap_or(current);
        expected = next_letter(current);
        start = whole.end();
    }

    options.push(AnswerOption {
        letter: current,
        text: text[start..].trim().to_string(),
    });

    options
}
