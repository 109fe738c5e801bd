//! WASM-compatible wrapper for multiple-choice question extraction.
//!
//! This crate exposes upload preview and table download to JavaScript
//! for use in Cloudflare Workers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mcq_core::{
    Error, ExtractionStats, LoadOptions, PreviewFormatter, QuestionExtractor, QuestionRecord,
    SourceDocument, SourceFormat, TableBuilder, TableRow,
};
use mcq_docx::{DocxReader, DocxTableWriter};
use mcq_pdf::PdfReader;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn init() {
    // Set up better panic messages in the console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// One previewed question.
#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewQuestion {
    pub number: u32,
    pub text: String,
    /// Always four cells; blank where the question has fewer options.
    pub options: Vec<String>,
    pub page: Option<usize>,
    /// `data:` URI of the attached image, if any.
    pub image: Option<String>,
}

/// Result of extracting questions from an upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Detected format of the source file.
    pub format: String,
    /// Number of questions found.
    pub question_count: usize,
    /// The first questions, as they will appear in the table.
    pub preview: Vec<PreviewQuestion>,
    /// Plain-text rendering of the preview.
    pub preview_text: String,
    /// Images that could not be extracted.
    pub warnings: Vec<String>,
    pub stats: ExtractionStats,
    /// Message shown instead of a preview when nothing was found.
    pub message: Option<String>,
}

/// Extract questions from an uploaded file and preview the first few.
///
/// # Arguments
/// * `data` - The raw bytes of the PDF, DOCX or text file
/// * `filename` - The original filename (used for format detection)
/// * `preview_limit` - Number of questions to include in the preview
///
/// # Returns
/// A JavaScript object with the extraction result, or throws on error.
#[wasm_bindgen]
pub fn extract_questions(
    data: &[u8],
    filename: &str,
    preview_limit: usize,
) -> Result<JsValue, JsValue> {
    let result =
        extract_questions_impl(data, filename, preview_limit).map_err(|e| JsValue::from_str(&e))?;

    serde_wasm_bindgen::to_value(&result)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Build the question table document for an uploaded file.
///
/// # Returns
/// A `Uint8Array` holding the DOCX file, or throws on error.
#[wasm_bindgen]
pub fn build_table_document(data: &[u8], filename: &str) -> Result<js_sys::Uint8Array, JsValue> {
    let bytes = build_table_document_impl(data, filename).map_err(|e| JsValue::from_str(&e))?;
    Ok(js_sys::Uint8Array::from(bytes.as_slice()))
}

fn load_document_impl(data: &[u8], filename: &str) -> Result<SourceDocument, String> {
    LoadOptions::new()
        .check_size(data.len() as u64)
        .map_err(|e| e.to_string())?;

    let format = SourceFormat::detect(data, filename).map_err(|e| e.to_string())?;

    match format {
        SourceFormat::Pdf => PdfReader::new()
            .read(data, filename)
            .map_err(|e| format!("PDF parsing error: {}", e)),
        SourceFormat::Docx => DocxReader::new()
            .read(Cursor::new(data), filename)
            .map_err(|e| format!("DOCX parsing error: {}", e)),
        SourceFormat::Text => Ok(SourceDocument::from_text_bytes(filename, data)),
    }
}

fn extract_questions_impl(
    data: &[u8],
    filename: &str,
    preview_limit: usize,
) -> Result<ExtractionResult, String> {
    let document = load_document_impl(data, filename)?;
    let format = document.format.as_str().to_string();

    let extraction = match QuestionExtractor::default().extract(&document) {
        Ok(extraction) => extraction,
        Err(Error::ParseError(_)) => {
            return Ok(ExtractionResult {
                format,
                question_count: 0,
                preview: Vec::new(),
                preview_text: String::new(),
                warnings: document.warnings.iter().map(|w| w.to_string()).collect(),
                stats: ExtractionStats {
                    pages: document.page_count,
                    warnings: document.warnings.len(),
                    ..Default::default()
                },
                message: Some(
                    "No questions found. Check that questions are numbered (e.g. \"1.\" or \"Q1\")."
                        .to_string(),
                ),
            });
        }
        Err(e) => return Err(e.to_string()),
    };

    let formatter = PreviewFormatter::new().with_limit(preview_limit);
    let preview = formatter
        .select(&extraction.questions)
        .iter()
        .map(preview_question)
        .collect();

    Ok(ExtractionResult {
        format,
        question_count: extraction.questions.len(),
        preview,
        preview_text: formatter.format(&extraction.questions),
        warnings: extraction.warnings.iter().map(|w| w.to_string()).collect(),
        stats: extraction.stats,
        message: None,
    })
}

fn preview_question(question: &QuestionRecord) -> PreviewQuestion {
    let row = TableRow::from_record(question);
    PreviewQuestion {
        number: question.number,
        text: row.question_text.to_string(),
        options: row.options.iter().map(|o| o.to_string()).collect(),
        page: question.page,
        image: row.image.map(|image| {
            format!(
                "data:{};base64,{}",
                image.kind.mime_type(),
                STANDARD.encode(&image.data)
            )
        }),
    }
}

fn build_table_document_impl(data: &[u8], filename: &str) -> Result<Vec<u8>, String> {
    let document = load_document_impl(data, filename)?;
    let extraction = QuestionExtractor::default()
        .extract(&document)
        .map_err(|e| e.to_string())?;

    let table = TableBuilder::new().build(&extraction.questions);
    DocxTableWriter::new()
        .to_bytes(&table)
        .map_err(|e| format!("DOCX writing error: {}", e))
}
