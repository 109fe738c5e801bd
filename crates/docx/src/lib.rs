//! DOCX (Office Open XML) backend for question extraction.
//!
//! Reads paragraphs and inline images from .docx uploads, and writes the
//! extracted questions back out as a single-table .docx document.

pub mod reader;
pub mod writer;

pub use reader::DocxReader;
pub use writer::DocxTableWriter;
