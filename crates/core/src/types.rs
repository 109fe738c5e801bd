//! Domain types for source documents and extracted questions.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default upload size limit (50 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of answer options kept per question (A-D).
pub const MAX_OPTIONS: usize = 4;

/// The format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Portable Document Format.
    Pdf,
    /// Word document (Office Open XML).
    Docx,
    /// Plain text.
    Text,
}

impl SourceFormat {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }

        // DOCX is a ZIP file (PK\x03\x04)
        if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
            return Some(Self::Docx);
        }

        None
    }

    /// Sniff the format of an upload from its content and filename.
    ///
    /// An extension outside {pdf, docx, txt} is rejected outright. Otherwise
    /// magic bytes win over the extension, and extensionless UTF-8 content is
    /// treated as plain text.
    pub fn detect(bytes: &[u8], filename: &str) -> Result<Self> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && !ext.contains(&['/', '\\'][..]));

        let by_extension = match ext {
            Some(ext) => Some(Self::from_extension(ext).ok_or_else(|| {
                Error::UnsupportedFileType(format!(".{} (expected pdf, docx or txt)", ext))
            })?),
            None => None,
        };

        if let Some(format) = Self::from_magic(bytes) {
            return Ok(format);
        }

        if let Some(format) = by_extension {
            return Ok(format);
        }

        if !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
            return Ok(Self::Text);
        }

        Err(Error::UnsupportedFileType(format!(
            "could not recognize the contents of '{}'",
            filename
        )))
    }

    /// Lowercase name used in user-facing output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "txt",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied to an upload before it is parsed.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Largest accepted input, in bytes.
    pub max_file_size: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl LoadOptions {
    /// Create load options with the default 50 MB limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size limit in bytes.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Reject inputs over the size limit.
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_size {
            return Err(Error::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }
}

/// Encoding of an embedded image, sniffed from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Emf,
    Wmf,
    Unknown,
}

impl ImageKind {
    /// Detect image encoding from magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Self::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if bytes.starts_with(b"GIF8") {
            Self::Gif
        } else if bytes.starts_with(b"BM") {
            Self::Bmp
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Self::Tiff
        } else if bytes.len() >= 44 && &bytes[40..44] == b" EMF" {
            Self::Emf
        } else if bytes.starts_with(&[0xD7, 0xCD, 0xC6, 0x9A]) {
            Self::Wmf
        } else {
            Self::Unknown
        }
    }

    /// File extension used when the image is stored in a package.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Emf => "emf",
            Self::Wmf => "wmf",
            Self::Unknown => "bin",
        }
    }

    /// MIME type of the encoding.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Emf => "image/x-emf",
            Self::Wmf => "image/x-wmf",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// An image attached to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionImage {
    /// Sniffed encoding.
    pub kind: ImageKind,

    /// Encoded image bytes. Not serialized; previews carry their own encoding.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl QuestionImage {
    /// Wrap encoded image bytes, sniffing the encoding.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            kind: ImageKind::from_magic(&data),
            data,
        }
    }
}

/// One unit of reader output, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// A line of text.
    Text(String),
    /// An image positioned at this point in the document.
    Image(QuestionImage),
    /// Start of a 1-based page (paged formats only).
    PageStart(usize),
}

/// A non-fatal failure to recover an embedded image.
///
/// The surrounding text is kept; only the image is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageExtractionWarning {
    /// Where the image was found (page, relationship id, object name).
    pub location: String,
    /// Why it was skipped.
    pub reason: String,
}

impl ImageExtractionWarning {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ImageExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image omitted at {}: {}", self.location, self.reason)
    }
}

/// An uploaded document reduced to an ordered stream of content blocks.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Original filename (without path).
    pub filename: String,

    /// Detected format of the source file.
    pub format: SourceFormat,

    /// Text lines, images and page boundaries in reading order.
    pub blocks: Vec<ContentBlock>,

    /// Number of pages, for paged formats.
    pub page_count: Option<usize>,

    /// Images that could not be recovered.
    pub warnings: Vec<ImageExtractionWarning>,
}

impl SourceDocument {
    /// Create an empty document with the given filename and format.
    pub fn new(filename: impl Into<String>, format: SourceFormat) -> Self {
        Self {
            filename: filename.into(),
            format,
            blocks: Vec::new(),
            page_count: None,
            warnings: Vec::new(),
        }
    }

    /// Build a document from plain text, one block per line.
    pub fn from_text(filename: impl Into<String>, text: &str) -> Self {
        let mut doc = Self::new(filename, SourceFormat::Text);
        for line in text.lines() {
            doc.add_text(line);
        }
        doc
    }

    /// Build a document from raw bytes of a plain text upload.
    pub fn from_text_bytes(filename: impl Into<String>, bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        Self::from_text(filename, text)
    }

    /// Append a text line.
    pub fn add_text(&mut self, text: impl Into<String>) {
        self.blocks.push(ContentBlock::Text(text.into()));
    }

    /// Append an image.
    pub fn add_image(&mut self, image: QuestionImage) {
        self.blocks.push(ContentBlock::Image(image));
    }

    /// Mark the start of a page.
    pub fn start_page(&mut self, page: usize) {
        self.blocks.push(ContentBlock::PageStart(page));
    }

    /// Record an image that could not be recovered.
    pub fn warn(&mut self, warning: ImageExtractionWarning) {
        log::warn!("{}: {}", self.filename, warning);
        self.warnings.push(warning);
    }

    /// Number of image blocks.
    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, ContentBlock::Image(_)))
            .count()
    }

    /// Iterate over text lines only.
    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }
}

/// One parsed multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Number taken from the question marker.
    pub number: u32,

    /// Question text with the marker removed.
    pub text: String,

    /// First image found between this marker and the next.
    pub image: Option<QuestionImage>,

    /// Answer options in encountered order; at most [`MAX_OPTIONS`].
    pub options: Vec<String>,

    /// 1-based page where the marker appeared (paged formats only).
    pub page: Option<usize>,
}

impl QuestionRecord {
    /// Create a question with no options or image.
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            image: None,
            options: Vec::new(),
            page: None,
        }
    }

    /// Append an option. Returns `false` if the record already holds
    /// [`MAX_OPTIONS`] options and the option was dropped.
    pub fn push_option(&mut self, option: impl Into<String>) -> bool {
        if self.options.len() >= MAX_OPTIONS {
            return false;
        }
        self.options.push(option.into());
        true
    }

    /// Attach an image unless one is already attached. Returns `false` if
    /// the image was dropped.
    pub fn attach_image(&mut self, image: QuestionImage) -> bool {
        if self.image.is_some() {
            return false;
        }
        self.image = Some(image);
        true
    }
}

/// Counters gathered over one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the source, for paged formats.
    pub pages: Option<usize>,
    /// Questions emitted.
    pub questions_found: usize,
    /// Images attached to a question.
    pub images_attached: usize,
    /// Images discarded (before the first question, or not the first for a question).
    pub images_dropped: usize,
    /// Options discarded beyond the four-option cap.
    pub options_dropped: usize,
    /// Images that could not be extracted at all.
    pub warnings: usize,
}

impl ExtractionStats {
    /// Render a plain-text report suitable for saving next to the output.
    pub fn to_report(&self) -> String {
        let mut out = String::from("Processing Statistics:\n");
        match self.pages {
            Some(pages) => {
                out.push_str(&format!("- Total Pages: {}\n", pages));
            }
            None => out.push_str("- Total Pages: N/A\n"),
        }
        out.push_str(&format!("- Questions Found: {}\n", self.questions_found));
        out.push_str(&format!("- Images Attached: {}\n", self.images_attached));
        out.push_str(&format!("- Images Dropped: {}\n", self.images_dropped));
        out.push_str(&format!("- Options Dropped: {}\n", self.options_dropped));
        out.push_str(&format!("- Image Warnings: {}\n", self.warnings));
        if let Some(pages) = self.pages.filter(|p| *p > 0) {
            out.push_str(&format!(
                "- Average Questions per Page: {:.1}\n",
                self.questions_found as f64 / pages as f64
            ));
        }
        out
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Questions in document order.
    pub questions: Vec<QuestionRecord>,
    /// Image problems reported by the reader.
    pub warnings: Vec<ImageExtractionWarning>,
    /// Counters for the pass.
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_magic() {
        assert_eq!(SourceFormat::from_magic(b"%PDF-1.7\n"), Some(SourceFormat::Pdf));
        assert_eq!(
            SourceFormat::from_magic(&[0x50, 0x4B, 0x03, 0x04, 0x14]),
            Some(SourceFormat::Docx)
        );
        assert_eq!(SourceFormat::from_magic(b"1. What"), None);
    }

    #[test]
    fn test_detect_rejects_unknown_extension() {
        let err = SourceFormat::detect(b"hello", "sheet.xlsx").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    #[test]
    fn test_detect_prefers_magic() {
        assert_eq!(
            SourceFormat::detect(b"%PDF-1.4", "questions.txt").unwrap(),
            SourceFormat::Pdf
        );
        assert_eq!(
            SourceFormat::detect(b"1. Q\nA. x", "questions.txt").unwrap(),
            SourceFormat::Text
        );
    }

    #[test]
    fn test_detect_extensionless_text() {
        assert_eq!(
            SourceFormat::detect(b"1. What?", "upload").unwrap(),
            SourceFormat::Text
        );
        assert!(SourceFormat::detect(&[0x00, 0xFF, 0x10], "upload").is_err());
    }

    #[test]
    fn test_size_limit() {
        let opts = LoadOptions::new().with_max_file_size(10);
        assert!(opts.check_size(10).is_ok());
        assert!(matches!(
            opts.check_size(11),
            Err(Error::FileTooLarge { size: 11, limit: 10 })
        ));
    }

    #[test]
    fn test_image_kind_from_magic() {
        assert_eq!(
            ImageKind::from_magic(&[0x89, b'P', b'N', b'G', 0x0D]),
            ImageKind::Png
        );
        assert_eq!(ImageKind::from_magic(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_magic(b"GIF89a"), ImageKind::Gif);
        assert_eq!(ImageKind::from_magic(b"????"), ImageKind::Unknown);
    }

    #[test]
    fn test_option_cap() {
        let mut q = QuestionRecord::new(1, "Pick one");
        for opt in ["a", "b", "c", "d"] {
            assert!(q.push_option(opt));
        }
        assert!(!q.push_option("e"));
        assert_eq!(q.options, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_first_image_wins() {
        let mut q = QuestionRecord::new(1, "Look");
        assert!(q.attach_image(QuestionImage::new(vec![0xFF, 0xD8, 0xFF, 1])));
        assert!(!q.attach_image(QuestionImage::new(vec![0x89, b'P', b'N', b'G'])));
        assert_eq!(q.image.unwrap().kind, ImageKind::Jpeg);
    }

    #[test]
    fn test_from_text_bytes_strips_bom() {
        let doc = SourceDocument::from_text_bytes("q.txt", "\u{feff}1. Hi\r\nA. x".as_bytes());
        let lines: Vec<&str> = doc.text_lines().collect();
        assert_eq!(lines, vec!["1. Hi", "A. x"]);
    }

    #[test]
    fn test_stats_report() {
        let stats = ExtractionStats {
            pages: Some(2),
            questions_found: 5,
            ..Default::default()
        };
        let report = stats.to_report();
        assert!(report.contains("- Total Pages: 2"));
        assert!(report.contains("- Questions Found: 5"));
        assert!(report.contains("- Average Questions per Page: 2.5"));
    }
}
