//! Error types for question extraction and table generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading a question document or rendering the table.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or read the input file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not a PDF, DOCX, or plain text document.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// The input exceeds the configured size limit.
    #[error("File too large: {size} bytes (limit is {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// No question markers were detected in the document.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to read the DOCX document structure.
    #[error("DOCX error: {0}")]
    DocxError(String),

    /// Failed to read the PDF document structure.
    #[error("PDF error: {0}")]
    PdfError(String),

    /// ZIP archive error (for DOCX input and output).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or writing error (for DOCX).
    #[error("XML error: {0}")]
    XmlError(String),

    /// Failed to produce the output table document.
    #[error("Render error: {0}")]
    RenderError(String),
}

impl Error {
    /// Whether this error should be shown to the user as an inline message
    /// rather than treated as a processing failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFileType(_) | Error::ParseError(_) | Error::FileTooLarge { .. }
        )
    }
}
