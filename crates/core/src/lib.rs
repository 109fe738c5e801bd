//! Core domain types, question extraction, and fixed-column table
//! projection for multiple-choice question documents.

pub mod error;
pub mod extract;
pub mod markers;
pub mod normalize;
pub mod preview;
pub mod table;
pub mod types;

pub use error::{Error, Result};
pub use extract::{ExtractorConfig, ParseState, QuestionExtractor, QuestionParser};
pub use markers::{LineClassifier, LineKind, MarkerMode, MarkerStyle};
pub use normalize::TextNormalizer;
pub use preview::{PreviewFormatter, DEFAULT_PREVIEW_LIMIT};
pub use table::{Table, TableBuilder, TableRow, TABLE_HEADER};
pub use types::{
    ContentBlock, Extraction, ExtractionStats, ImageExtractionWarning, ImageKind, LoadOptions,
    QuestionImage, QuestionRecord, SourceDocument, SourceFormat, MAX_OPTIONS,
};
