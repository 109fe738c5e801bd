//! Question extraction from a source document's content stream.
//!
//! Lines are normalized, classified, and fed through [`QuestionParser`], a
//! three-state machine that groups them into [`QuestionRecord`]s.

use crate::error::{Error, Result};
use crate::markers::{LineClassifier, LineKind, MarkerMode};
use crate::normalize::TextNormalizer;
use crate::types::{
    ContentBlock, Extraction, ExtractionStats, QuestionImage, QuestionRecord, SourceDocument,
};

/// Parser state between lines.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseState {
    /// No question has started yet.
    AwaitingQuestion,
    /// A question marker was seen; text lines extend the question.
    InQuestionText(QuestionRecord),
    /// At least one option was seen; only options and new questions matter.
    InOptions(QuestionRecord),
}

/// Line-by-line question state machine.
#[derive(Debug)]
pub struct QuestionParser {
    state: ParseState,
    current_page: Option<usize>,
    questions: Vec<QuestionRecord>,
    stats: ExtractionStats,
}

impl Default for QuestionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionParser {
    /// Create a parser awaiting its first question.
    pub fn new() -> Self {
        Self {
            state: ParseState::AwaitingQuestion,
            current_page: None,
            questions: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Feed one classified line.
    pub fn feed_line(&mut self, kind: LineKind) {
        let state = std::mem::replace(&mut self.state, ParseState::AwaitingQuestion);

        self.state = match (state, kind) {
            (previous, LineKind::Question { number, text }) => {
                self.flush(previous);
                let mut question = QuestionRecord::new(number, text);
                question.page = self.current_page;
                ParseState::InQuestionText(question)
            }
            (ParseState::AwaitingQuestion, _) => ParseState::AwaitingQuestion,
            (ParseState::InQuestionText(mut question), LineKind::Text(text)) => {
                if !question.text.is_empty() {
                    question.text.push(' ');
                }
                question.text.push_str(&text);
                ParseState::InQuestionText(question)
            }
            (ParseState::InQuestionText(mut question), LineKind::Options(options))
            | (ParseState::InOptions(mut question), LineKind::Options(options)) => {
                for option in options {
                    if !question.push_option(option.text) {
                        log::debug!(
                            "Dropping option {} of question {} (limit reached)",
                            option.letter,
                            question.number
                        );
                        self.stats.options_dropped += 1;
                    }
                }
                ParseState::InOptions(question)
            }
            (ParseState::InOptions(question), LineKind::Text(_)) => ParseState::InOptions(question),
        };
    }

    /// Feed an image positioned after the lines fed so far.
    pub fn feed_image(&mut self, image: QuestionImage) {
        match &mut self.state {
            ParseState::InQuestionText(question) | ParseState::InOptions(question) => {
                if question.attach_image(image) {
                    self.stats.images_attached += 1;
                } else {
                    log::debug!(
                        "Dropping extra image for question {} (first image wins)",
                        question.number
                    );
                    self.stats.images_dropped += 1;
                }
            }
            ParseState::AwaitingQuestion => {
                log::debug!("Dropping image that precedes the first question");
                self.stats.images_dropped += 1;
            }
        }
    }

    /// Note the start of a page; questions starting afterwards record it.
    pub fn start_page(&mut self, page: usize) {
        self.current_page = Some(page);
    }

    /// Flush the open question and return all questions with the counters.
    pub fn finish(mut self) -> (Vec<QuestionRecord>, ExtractionStats) {
        let state = std::mem::replace(&mut self.state, ParseState::AwaitingQuestion);
        self.flush(state);
        self.stats.questions_found = self.questions.len();
        (self.questions, self.stats)
    }

    fn flush(&mut self, state: ParseState) {
        match state {
            ParseState::InQuestionText(question) | ParseState::InOptions(question) => {
                self.questions.push(question);
            }
            ParseState::AwaitingQuestion => {}
        }
    }
}

/// Extractor settings.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Which question marker styles are recognized.
    pub marker_mode: MarkerMode,
    /// Split "A. x  B. y" lines into separate options.
    pub split_inline_options: bool,
    /// Repair misread numbering ("1o ", "1.What") before classification.
    pub repair_numbering: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            marker_mode: MarkerMode::Auto,
            split_inline_options: true,
            repair_numbering: true,
        }
    }
}

impl ExtractorConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the marker mode.
    pub fn with_marker_mode(mut self, mode: MarkerMode) -> Self {
        self.marker_mode = mode;
        self
    }

    /// Set whether inline options are split.
    pub fn with_split_inline_options(mut self, split: bool) -> Self {
        self.split_inline_options = split;
        self
    }

    /// Set whether misread numbering is repaired.
    pub fn with_repair_numbering(mut self, repair: bool) -> Self {
        self.repair_numbering = repair;
        self
    }
}

/// Extracts questions from source documents.
#[derive(Debug, Clone, Default)]
pub struct QuestionExtractor {
    config: ExtractorConfig,
}

impl QuestionExtractor {
    /// Create an extractor with the given configuration.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Extract questions from a document.
    ///
    /// Returns [`Error::ParseError`] when no question marker is found.
    pub fn extract(&self, doc: &SourceDocument) -> Result<Extraction> {
        let normalizer = TextNormalizer::new().with_repair_numbering(self.config.repair_numbering);

        // Normalize once, keeping block order so images stay positioned.
        let blocks: Vec<NormalizedBlock<'_>> = doc
            .blocks
            .iter()
            .flat_map(|block| match block {
                ContentBlock::Text(text) => normalizer
                    .normalize_to_lines(text)
                    .into_iter()
                    .map(NormalizedBlock::Line)
                    .collect::<Vec<_>>(),
                ContentBlock::Image(image) => vec![NormalizedBlock::Image(image)],
                ContentBlock::PageStart(page) => vec![NormalizedBlock::Page(*page)],
            })
            .collect();

        let lines = blocks.iter().filter_map(|b| match b {
            NormalizedBlock::Line(line) => Some(line.as_str()),
            _ => None,
        });
        let classifier = LineClassifier::for_mode(self.config.marker_mode, lines)
            .with_split_inline_options(self.config.split_inline_options);

        log::debug!(
            "Extracting from '{}' ({} blocks) using marker styles {:?}",
            doc.filename,
            blocks.len(),
            classifier.styles()
        );

        let mut parser = QuestionParser::new();
        for block in blocks {
            match block {
                NormalizedBlock::Line(line) => parser.feed_line(classifier.classify(&line)),
                NormalizedBlock::Image(image) => parser.feed_image(image.clone()),
                NormalizedBlock::Page(page) => parser.start_page(page),
            }
        }

        let (questions, mut stats) = parser.finish();
        stats.pages = doc.page_count;
        stats.warnings = doc.warnings.len();

        if questions.is_empty() {
            return Err(Error::ParseError(format!(
                "no questions found in '{}'",
                doc.filename
            )));
        }

        log::debug!(
            "Extracted {} questions from '{}' ({} images attached, {} dropped)",
            stats.questions_found,
            doc.filename,
            stats.images_attached,
            stats.images_dropped
        );

        Ok(Extraction {
            questions,
            warnings: doc.warnings.clone(),
            stats,
        })
    }

    /// Extract questions from plain text.
    pub fn extract_text(&self, filename: &str, text: &str) -> Result<Extraction> {
        self.extract(&SourceDocument::from_text(filename, text))
    }
}

enum NormalizedBlock<'a> {
    Line(String),
    Image(&'a QuestionImage),
    Page(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{AnswerOption, MarkerStyle};
    use crate::types::SourceFormat;

    fn png(tag: u8) -> QuestionImage {
        QuestionImage::new(vec![0x89, b'P', b'N', b'G', tag])
    }

    fn extract(text: &str) -> Vec<QuestionRecord> {
        QuestionExtractor::default()
            .extract_text("test.txt", text)
            .unwrap()
            .questions
    }

    #[test]
    fn test_basic_example() {
        let questions = extract("1. What is 2+2?\nA. 3\nB. 4\nC. 5");

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].number, 1);
        assert_eq!(questions[0].text, "What is 2+2?");
        assert_eq!(questions[0].options, vec!["3", "4", "5"]);
        assert_eq!(questions[0].image, None);
    }

    #[test]
    fn test_two_options() {
        let questions = extract("1. Pick\nA. textA\nB. textB");
        assert_eq!(questions[0].options, vec!["textA", "textB"]);
    }

    #[test]
    fn test_question_count_matches_markers() {
        let text = "1. One\nA. a\n2. Two\nA. a\nB. b\n3. Three\n4. Four\nA. x";
        let questions = extract(text);

        assert_eq!(questions.len(), 4);
        let numbers: Vec<u32> = questions.iter().map(|q| q.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(questions[2].options.is_empty());
    }

    #[test]
    fn test_multiline_question_text() {
        let questions = extract("1. Which of the following\nis a prime\n\nnumber?\nA. 4\nB. 7");
        assert_eq!(questions[0].text, "Which of the following is a prime number?");
    }

    #[test]
    fn test_text_after_options_is_ignored() {
        let questions = extract("1. Q\nA. one\nstray line\nB. two");
        assert_eq!(questions[0].text, "Q");
        assert_eq!(questions[0].options, vec!["one", "two"]);
    }

    #[test]
    fn test_fifth_option_dropped() {
        let extraction = QuestionExtractor::default()
            .extract_text("t.txt", "1. Q\nA. a\nB. b\nC. c\nD. d\nE. e")
            .unwrap();

        assert_eq!(extraction.questions[0].options, vec!["a", "b", "c", "d"]);
        assert_eq!(extraction.stats.options_dropped, 1);
    }

    #[test]
    fn test_preamble_before_first_question_is_ignored() {
        let questions = extract("Physics Quiz\nA. not an option\n1. Speed of light?\nA. c");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Speed of light?");
        assert_eq!(questions[0].options, vec!["c"]);
    }

    #[test]
    fn test_marker_on_its_own_line() {
        let questions = extract("1.\nWhat is water?\nA. H2O");
        assert_eq!(questions[0].text, "What is water?");
    }

    #[test]
    fn test_no_markers_is_parse_error() {
        let result = QuestionExtractor::default().extract_text("t.txt", "just some prose\nmore");
        assert!(matches!(result, Err(Error::ParseError(_))));

        let result = QuestionExtractor::default().extract_text("t.txt", "");
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn test_inline_options() {
        let questions = extract("1. 2+2?\nA. 3   B. 4   C. 5   D. 6");
        assert_eq!(questions[0].options, vec!["3", "4", "5", "6"]);
    }

    #[test]
    fn test_ocr_numbering_repair() {
        let questions = extract("1o First\nA. a\n2.Second\nA. b");
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].text, "Second");
    }

    #[test]
    fn test_auto_mode_uses_dominant_style() {
        let text = "Q1. Which rule\n1) is listed first\nA. x\nQ2. Next\nA. y";
        let questions = extract(text);

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "Which rule 1) is listed first");
    }

    #[test]
    fn test_any_mode_accepts_every_style() {
        let extractor = QuestionExtractor::new(
            ExtractorConfig::new().with_marker_mode(MarkerMode::Any),
        );
        let questions = extractor
            .extract_text("t.txt", "1. One\nQ2. Two\n(3) Three")
            .unwrap()
            .questions;
        assert_eq!(questions.len(), 3);
    }

    #[test]
    fn test_only_mode() {
        let extractor = QuestionExtractor::new(
            ExtractorConfig::new().with_marker_mode(MarkerMode::Only(MarkerStyle::Enclosed)),
        );
        let result = extractor.extract_text("t.txt", "1. One\n2. Two");
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn test_images_attach_to_enclosing_question() {
        let mut doc = SourceDocument::new("q.pdf", SourceFormat::Pdf);
        doc.start_page(1);
        doc.add_image(png(0));
        doc.add_text("1. Look at the figure");
        doc.add_image(png(1));
        doc.add_text("A. yes");
        doc.add_image(png(2));
        doc.start_page(2);
        doc.add_text("2. No figure");
        doc.add_text("A. ok");
        doc.page_count = Some(2);

        let extraction = QuestionExtractor::default().extract(&doc).unwrap();
        let questions = extraction.questions;

        assert_eq!(questions[0].image, Some(png(1)));
        assert_eq!(questions[0].page, Some(1));
        assert_eq!(questions[1].image, None);
        assert_eq!(questions[1].page, Some(2));
        assert_eq!(extraction.stats.images_attached, 1);
        assert_eq!(extraction.stats.images_dropped, 2);
        assert_eq!(extraction.stats.pages, Some(2));
    }

    #[test]
    fn test_state_transitions() {
        let mut parser = QuestionParser::new();
        assert_eq!(parser.state(), &ParseState::AwaitingQuestion);

        parser.feed_line(LineKind::Text("intro".into()));
        assert_eq!(parser.state(), &ParseState::AwaitingQuestion);

        parser.feed_line(LineKind::Question {
            number: 1,
            text: String::new(),
        });
        assert!(matches!(parser.state(), ParseState::InQuestionText(_)));

        parser.feed_line(LineKind::Options(vec![AnswerOption {
            letter: 'A',
            text: "a".into(),
        }]));
        assert!(matches!(parser.state(), ParseState::InOptions(_)));

        parser.feed_line(LineKind::Question {
            number: 2,
            text: "next".into(),
        });
        assert!(matches!(parser.state(), ParseState::InQuestionText(q) if q.number == 2));

        let (questions, stats) = parser.finish();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "");
        assert_eq!(stats.questions_found, 2);
    }
}
