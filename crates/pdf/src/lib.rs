//! PDF backend for question extraction.
//!
//! Text and images are read from page content streams with `lopdf`, keeping
//! drawing order so each image can be attached to the question it follows.

pub mod reader;

pub use reader::PdfReader;
