//! Fixed-column table projection of extracted questions.
//!
//! Every row has a question cell and exactly four option cells; missing
//! options become blank cells and anything past the fourth is dropped.

use crate::types::{QuestionImage, QuestionRecord, MAX_OPTIONS};

/// Header row of the output table.
pub const TABLE_HEADER: [&str; 5] = ["Question", "Option A", "Option B", "Option C", "Option D"];

/// Render-time projection of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRow<'a> {
    /// Question text for the first cell.
    pub question_text: &'a str,
    /// Image shown below the question text in the first cell.
    pub image: Option<&'a QuestionImage>,
    /// Option cells, blank where the question has fewer than four options.
    pub options: [&'a str; MAX_OPTIONS],
}

impl<'a> TableRow<'a> {
    /// Project a question record onto the fixed column layout.
    pub fn from_record(record: &'a QuestionRecord) -> Self {
        let mut options = [""; MAX_OPTIONS];
        for (cell, option) in options.iter_mut().zip(record.options.iter()) {
            *cell = option.as_str();
        }

        Self {
            question_text: &record.text,
            image: record.image.as_ref(),
            options,
        }
    }

    /// All five cell texts in column order.
    pub fn cells(&self) -> [&'a str; 5] {
        [
            self.question_text,
            self.options[0],
            self.options[1],
            self.options[2],
            self.options[3],
        ]
    }
}

/// A table ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table<'a> {
    /// Header cells, if a header row is emitted.
    pub header: Option<[&'static str; 5]>,
    /// One row per question, in input order.
    pub rows: Vec<TableRow<'a>>,
}

impl Table<'_> {
    /// Number of embedded images.
    pub fn image_count(&self) -> usize {
        self.rows.iter().filter(|r| r.image.is_some()).count()
    }

    /// Render as tab-separated text, one row per line.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        if let Some(header) = self.header {
            out.push_str(&header.join("\t"));
            out.push('\n');
        }
        for row in &self.rows {
            let cells: Vec<String> = row
                .cells()
                .iter()
                .map(|c| c.replace(&['\t', '\n'][..], " "))
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

/// Builds tables from question records.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    include_header: bool,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self {
            include_header: true,
        }
    }
}

impl TableBuilder {
    /// Create a builder that emits the header row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the header row is emitted.
    pub fn with_header(mut self, include: bool) -> Self {
        self.include_header = include;
        self
    }

    /// Project each record onto a row, preserving input order.
    pub fn build<'a>(&self, records: &'a [QuestionRecord]) -> Table<'a> {
        Table {
            header: self.include_header.then_some(TABLE_HEADER),
            rows: records.iter().map(TableRow::from_record).collect(),
        }
    }
}
