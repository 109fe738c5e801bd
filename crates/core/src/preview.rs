//! Plain-text preview of the first few extracted questions.

use crate::table::TableRow;
use crate::types::QuestionRecord;

/// Default number of questions shown in a preview.
pub const DEFAULT_PREVIEW_LIMIT: usize = 5;

const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Formatter for question previews.
#[derive(Debug, Clone)]
pub struct PreviewFormatter {
    /// Number of questions shown.
    limit: usize,
}

impl Default for PreviewFormatter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl PreviewFormatter {
    /// Create a formatter showing the default five questions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a formatter showing at most `limit` questions (0 disables the preview).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The questions that would be previewed.
    pub fn select<'a>(&self, questions: &'a [QuestionRecord]) -> &'a [QuestionRecord] {
        &questions[..questions.len().min(self.limit)]
    }

    /// Format the previewed questions.
    ///
    /// # Example output
    /// ```text
    /// Question 1 (page 2) [image]
    ///   What is 2+2?
    ///   A. 3
    ///   B. 4
    ///   C. 5
    ///   D.
    /// ```
    pub fn format(&self, questions: &[QuestionRecord]) -> String {
        let shown = self.select(questions);
        let mut blocks: Vec<String> = shown.iter().map(format_question).collect();

        if questions.len() > shown.len() && !shown.is_empty() {
            blocks.push(format!(
                "... and {} more",
                questions.len() - shown.len()
            ));
        }

        blocks.join("\n\n")
    }
}

fn format_question(question: &QuestionRecord) -> String {
    let row = TableRow::from_record(question);

    let mut heading = format!("Question {}", question.number);
    if let Some(page) = question.page {
        heading.push_str(&format!(" (page {})", page));
    }
    if row.image.is_some() {
        heading.push_str(" [image]");
    }

    let mut lines = vec![heading, format!("  {}", row.question_text)];
    for (letter, option) in OPTION_LETTERS.iter().zip(row.options.iter()) {
        lines.push(format!("  {}. {}", letter, option).trim_end().to_string());
    }
    lines.join("\n")
}
