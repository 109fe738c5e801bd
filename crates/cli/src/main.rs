//! CLI tool for extracting multiple-choice questions into a DOCX table.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mcq_core::{
    Error, Extraction, ExtractorConfig, LoadOptions, MarkerMode, MarkerStyle, PreviewFormatter,
    QuestionExtractor, SourceDocument, SourceFormat, TableBuilder,
};
use mcq_docx::{DocxReader, DocxTableWriter};
use mcq_pdf::PdfReader;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Question numbering syntax accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MarkerStyleArg {
    /// Use the style most common in each document
    Auto,
    /// Accept every style
    Any,
    /// "1. Question"
    Dotted,
    /// "1) Question"
    Parenthesized,
    /// "(1) Question"
    Enclosed,
    /// "Q1. Question"
    Prefixed,
    /// "Question 1. Text"
    Worded,
    /// "1- Question"
    Dashed,
}

impl From<MarkerStyleArg> for MarkerMode {
    fn from(arg: MarkerStyleArg) -> Self {
        match arg {
            MarkerStyleArg::Auto => MarkerMode::Auto,
            MarkerStyleArg::Any => MarkerMode::Any,
            MarkerStyleArg::Dotted => MarkerMode::Only(MarkerStyle::Dotted),
            MarkerStyleArg::Parenthesized => MarkerMode::Only(MarkerStyle::Parenthesized),
            MarkerStyleArg::Enclosed => MarkerMode::Only(MarkerStyle::Enclosed),
            MarkerStyleArg::Prefixed => MarkerMode::Only(MarkerStyle::Prefixed),
            MarkerStyleArg::Worded => MarkerMode::Only(MarkerStyle::Worded),
            MarkerStyleArg::Dashed => MarkerMode::Only(MarkerStyle::Dashed),
        }
    }
}

/// Extract multiple-choice questions from PDF, DOCX or text files into a Word table.
#[derive(Parser, Debug)]
#[command(name = "mcq-extract")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file(s) (.pdf, .docx or .txt)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Output directory (default: same as input file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of questions to preview (0 disables the preview)
    #[arg(short = 'n', long, default_value = "5")]
    preview: usize,

    /// Print the table as tab-separated text instead of writing DOCX
    #[arg(short, long)]
    print: bool,

    /// Question numbering style
    #[arg(long, value_enum, default_value = "auto")]
    marker_style: MarkerStyleArg,

    /// Read PDF pages as this many side-by-side columns
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=4))]
    columns: u8,

    /// Do not split options written on one line ("A. x B. y")
    #[arg(long)]
    no_inline_options: bool,

    /// Do not repair misread question numbers ("1o" -> "1.")
    #[arg(long)]
    no_ocr_repair: bool,

    /// Omit the header row
    #[arg(long)]
    no_header: bool,

    /// Portrait pages instead of landscape
    #[arg(long)]
    portrait: bool,

    /// Width of embedded question images, in inches
    #[arg(long, default_value = "3.0")]
    image_width: f64,

    /// Also write the parsed questions as JSON
    #[arg(long)]
    json: bool,

    /// Also write an extraction statistics report
    #[arg(long)]
    stats: bool,

    /// Largest accepted input, in megabytes
    #[arg(long, default_value = "50")]
    max_size_mb: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig::new()
            .with_marker_mode(self.marker_style.into())
            .with_split_inline_options(!self.no_inline_options)
            .with_repair_numbering(!self.no_ocr_repair)
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions::new().with_max_file_size(self.max_size_mb.saturating_mul(BYTES_PER_MB))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let extractor = QuestionExtractor::new(args.extractor_config());
    let preview = PreviewFormatter::new().with_limit(args.preview);
    let tables = TableBuilder::new().with_header(!args.no_header);
    let writer = DocxTableWriter::new()
        .with_landscape(!args.portrait)
        .with_image_width(args.image_width);

    for input_path in &args.input {
        if args.verbose {
            eprintln!("Processing: {}", input_path.display());
        }

        let extraction = match process_file(input_path, &args, &extractor) {
            Ok(extraction) => extraction,
            Err(e) => {
                report_error(input_path, &e);
                continue;
            }
        };

        for warning in &extraction.warnings {
            eprintln!("Warning ({}): {}", input_path.display(), warning);
        }

        let preview_text = preview.format(&extraction.questions);
        if !preview_text.is_empty() && !args.print {
            println!(
                "{}: {} questions\n\n{}\n",
                input_path.display(),
                extraction.questions.len(),
                preview_text
            );
        }

        if let Err(e) = write_results(input_path, &args, &extraction, &tables, &writer) {
            eprintln!("Error writing output for {}: {:#}", input_path.display(), e);
        }
    }

    Ok(())
}

/// Write the table (or print it) plus the optional JSON and statistics files.
fn write_results(
    input_path: &Path,
    args: &Args,
    extraction: &Extraction,
    tables: &TableBuilder,
    writer: &DocxTableWriter,
) -> Result<()> {
    let table = tables.build(&extraction.questions);
    if args.print {
        print!("{}", table.to_tsv());
    } else {
        let docx = writer.to_bytes(&table).context("Failed to build DOCX")?;
        let output_path = get_output_path(input_path, args.output.as_ref(), "_mcqs.docx")?;
        write_output(&output_path, &docx)?;
        if args.verbose {
            eprintln!("Written to: {}", output_path.display());
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&extraction.questions)
            .context("Failed to serialize questions")?;
        let json_path = get_output_path(input_path, args.output.as_ref(), "_mcqs.json")?;
        write_output(&json_path, json.as_bytes())?;
    }

    if args.stats {
        let stats_path = get_output_path(input_path, args.output.as_ref(), "_stats.txt")?;
        write_output(&stats_path, extraction.stats.to_report().as_bytes())?;
    }

    Ok(())
}

/// Print a per-file failure; the remaining inputs are still processed.
fn report_error(input_path: &Path, e: &anyhow::Error) {
    match e.downcast_ref::<Error>() {
        Some(Error::ParseError(_)) => {
            eprintln!(
                "No questions found in {}. Check that questions are numbered (e.g. \"1.\" or \"Q1\").",
                input_path.display()
            );
        }
        Some(err) if err.is_user_facing() => {
            eprintln!("{}: {}", input_path.display(), err);
        }
        _ => {
            eprintln!("Error processing {}: {:#}", input_path.display(), e);
        }
    }
}

/// Read, detect and extract questions from a single file.
fn process_file(
    input_path: &Path,
    args: &Args,
    extractor: &QuestionExtractor,
) -> Result<Extraction> {
    let metadata = std::fs::metadata(input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;
    args.load_options().check_size(metadata.len())?;

    let data = std::fs::read(input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;

    let filename = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let format = SourceFormat::detect(&data, filename)?;
    log::debug!("Parsing {} as {}", filename, format);

    let document = load_document(&data, filename, format, args.columns.into())?;

    if args.verbose {
        eprintln!(
            "  Read {} blocks ({} images){}",
            document.blocks.len(),
            document.image_count(),
            document
                .page_count
                .map(|p| format!(" from {} pages", p))
                .unwrap_or_default()
        );
    }

    let extraction = extractor.extract(&document)?;

    if args.verbose {
        eprintln!("  Extracted {} questions", extraction.questions.len());
    }

    Ok(extraction)
}

/// Reduce raw file bytes to a source document.
fn load_document(
    data: &[u8],
    filename: &str,
    format: SourceFormat,
    columns: usize,
) -> mcq_core::Result<SourceDocument> {
    match format {
        SourceFormat::Pdf => PdfReader::new().with_columns(columns).read(data, filename),
        SourceFormat::Docx => DocxReader::new().read(Cursor::new(data), filename),
        SourceFormat::Text => Ok(SourceDocument::from_text_bytes(filename, data)),
    }
}

/// Determine the output path for a processed file.
fn get_output_path(input_path: &Path, output_dir: Option<&PathBuf>, suffix: &str) -> Result<PathBuf> {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let output_filename = format!("{}{}", stem, suffix);

    let output_path = match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
            dir.join(output_filename)
        }
        None => {
            if let Some(parent) = input_path.parent() {
                parent.join(output_filename)
            } else {
                PathBuf::from(output_filename)
            }
        }
    };

    Ok(output_path)
}

/// Write output to a file.
fn write_output(path: &Path, content: &[u8]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write to {}", path.display()))?;

    Ok(())
}
