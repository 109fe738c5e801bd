//! PDF reader implementation.
//!
//! Walks each page's content stream in drawing order so that images land
//! between the text lines they were placed between. Multi-column pages can
//! instead be read column by column, top to bottom.

use image::{DynamicImage, GrayImage, ImageOutputFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use mcq_core::{Error, ImageExtractionWarning, QuestionImage, Result, SourceDocument, SourceFormat};
use std::io::Cursor;

/// Vertical distance (in text space units) below which two runs share a line.
const LINE_TOLERANCE: f64 = 1.0;

/// `TJ` adjustments more negative than this (thousandths of an em) are word gaps.
const TJ_SPACE_THRESHOLD: f64 = -200.0;

/// Upper bound on `Parent` links followed when collecting inherited resources.
const MAX_TREE_DEPTH: usize = 32;

/// US Letter, used when a page has no usable `MediaBox`.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Largest image, in pixels, that is re-encoded from raw samples.
const MAX_IMAGE_PIXELS: usize = 64 * 1024 * 1024;

/// Reader for PDF files.
#[derive(Debug, Clone)]
pub struct PdfReader {
    /// Number of equal-width columns each page is read in.
    columns: usize,
}

impl PdfReader {
    /// Create a new PDF reader that follows content-stream order.
    pub fn new() -> Self {
        Self { columns: 1 }
    }

    /// Read pages as `columns` side-by-side columns: the leftmost column
    /// top to bottom, then the next. `1` keeps content-stream order.
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns.max(1);
        self
    }

    /// Read a PDF file into text lines, positioned images and page boundaries.
    pub fn read(&self, data: &[u8], filename: &str) -> Result<SourceDocument> {
        let doc = Document::load_mem(data)
            .map_err(|e| Error::PdfError(format!("Failed to load PDF: {}", e)))?;

        if doc.is_encrypted() {
            return Err(Error::PdfError(format!(
                "'{}' is encrypted and cannot be read",
                filename
            )));
        }

        let pages = doc.get_pages();
        let mut source = SourceDocument::new(filename, SourceFormat::Pdf);
        source.page_count = Some(pages.len());

        for (&page_num, &page_id) in &pages {
            let page = page_num as usize;
            source.start_page(page);
            if let Err(e) = self.read_page(&doc, page, page_id, &mut source) {
                log::warn!("Skipping unreadable page {} of '{}': {}", page, filename, e);
            }
        }

        log::debug!(
            "Read {} pages from '{}' ({} blocks, {} images)",
            pages.len(),
            filename,
            source.blocks.len(),
            source.image_count()
        );

        Ok(source)
    }

    fn read_page(
        &self,
        doc: &Document,
        page: usize,
        page_id: ObjectId,
        source: &mut SourceDocument,
    ) -> Result<()> {
        let raw = doc.get_page_content(page_id).map_err(pdf_error)?;
        let content = Content::decode(&raw).map_err(pdf_error)?;
        let resources = page_resources(doc, page_id);

        if has_composite_font(doc, &resources) {
            log::debug!("Page {} uses composite fonts, using library text extraction", page);
            return self.read_page_fallback(doc, page, &content, &resources, source);
        }

        let grid = (self.columns > 1).then(|| ColumnGrid::new(media_box(doc, page_id), self.columns));
        let mut lines = LineBuilder::new(grid);
        for op in &content.operations {
            match op.operator.as_str() {
                "q" => lines.save_state(),
                "Q" => lines.restore_state(),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(op) {
                        lines.concat(m);
                    }
                }
                "BT" => lines.begin_text(),
                "Td" | "TD" => {
                    let tx = operand(op, 0).unwrap_or(0.0);
                    let ty = operand(op, 1).unwrap_or(0.0);
                    if op.operator == "TD" {
                        lines.leading = -ty;
                    }
                    lines.move_by(tx, ty);
                }
                "Tm" => {
                    if let (Some(x), Some(y)) = (operand(op, 4), operand(op, 5)) {
                        lines.move_to(x, y);
                    }
                }
                "TL" => lines.leading = operand(op, 0).unwrap_or(0.0),
                "T*" => lines.next_line(),
                "Tj" => {
                    if let Some(text) = op.operands.first().and_then(decode_string) {
                        lines.show(&text);
                    }
                }
                "'" => {
                    lines.next_line();
                    if let Some(text) = op.operands.first().and_then(decode_string) {
                        lines.show(&text);
                    }
                }
                "\"" => {
                    lines.next_line();
                    if let Some(text) = op.operands.get(2).and_then(decode_string) {
                        lines.show(&text);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        show_array(&mut lines, items);
                    }
                }
                "Do" => {
                    lines.flush();
                    if let Some(image) = place_xobject(doc, page, op, &resources, source) {
                        lines.image(image);
                    }
                }
                _ => {}
            }
        }
        lines.finish(source);

        Ok(())
    }

    /// Text from the library extractor, then the page's images in drawing order.
    fn read_page_fallback(
        &self,
        doc: &Document,
        page: usize,
        content: &Content<Vec<Operation>>,
        resources: &[&Dictionary],
        source: &mut SourceDocument,
    ) -> Result<()> {
        let text = doc.extract_text(&[page as u32]).map_err(pdf_error)?;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            source.add_text(line);
        }

        for op in content.operations.iter().filter(|op| op.operator == "Do") {
            if let Some(image) = place_xobject(doc, page, op, resources, source) {
                source.add_image(image);
            }
        }
        Ok(())
    }
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::new()
    }
}

fn pdf_error(e: lopdf::Error) -> Error {
    Error::PdfError(e.to_string())
}

/// Affine transform `[a b c d e f]` as used by `cm` and `Tm`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Default for Matrix {
    fn default() -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }
}

impl Matrix {
    fn from_operands(op: &Operation) -> Option<Self> {
        let mut m = [0.0; 6];
        for (i, value) in m.iter_mut().enumerate() {
            *value = operand(op, i)?;
        }
        Some(Matrix(m))
    }

    /// This transform followed by `outer`.
    fn then(self, outer: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = outer.0;
        Matrix([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

/// Equal-width vertical columns across a page's media box.
#[derive(Debug, Clone, Copy)]
struct ColumnGrid {
    left: f64,
    width: f64,
    count: usize,
}

impl ColumnGrid {
    fn new(media_box: [f64; 4], count: usize) -> Self {
        let [x0, _, x1, _] = media_box;
        Self {
            left: x0.min(x1),
            width: (x1 - x0).abs() / count as f64,
            count,
        }
    }

    fn column_of(&self, x: f64) -> usize {
        if self.width <= 0.0 {
            return 0;
        }
        let index = ((x - self.left) / self.width).floor();
        if index <= 0.0 {
            0
        } else {
            (index as usize).min(self.count - 1)
        }
    }
}

#[derive(Debug)]
enum Placement {
    Text(String),
    Image(QuestionImage),
}

/// A finished line or image and where on the page it starts.
#[derive(Debug)]
struct Placed {
    x: f64,
    y: f64,
    content: Placement,
}

/// Accumulates shown text into lines, breaking on vertical movement.
#[derive(Debug, Default)]
struct LineBuilder {
    line: String,
    /// Page position and column of the first run in `line`.
    line_start: (f64, f64),
    line_column: usize,
    /// Text line matrix origin, in text space.
    line_x: f64,
    line_y: f64,
    leading: f64,
    /// Baseline of the last shown run.
    shown_y: Option<f64>,
    break_pending: bool,
    /// The text position was set since the last run.
    repositioned: bool,
    ctm: Matrix,
    saved: Vec<Matrix>,
    grid: Option<ColumnGrid>,
    placed: Vec<Placed>,
}

impl LineBuilder {
    fn new(grid: Option<ColumnGrid>) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    fn save_state(&mut self) {
        self.saved.push(self.ctm);
    }

    fn restore_state(&mut self) {
        if let Some(ctm) = self.saved.pop() {
            self.ctm = ctm;
        }
    }

    fn concat(&mut self, m: Matrix) {
        self.ctm = m.then(self.ctm);
    }

    fn begin_text(&mut self) {
        self.line_x = 0.0;
        self.line_y = 0.0;
        self.repositioned = true;
    }

    fn move_by(&mut self, tx: f64, ty: f64) {
        self.line_x += tx;
        self.line_y += ty;
        self.repositioned = true;
        if ty == 0.0 && tx > 0.0 {
            self.space();
        }
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.line_x = x;
        self.line_y = y;
        self.repositioned = true;
    }

    fn next_line(&mut self) {
        self.line_y -= self.leading;
        self.break_pending = true;
    }

    fn show(&mut self, text: &str) {
        let (x, y) = self.ctm.apply(self.line_x, self.line_y);
        let column = self.grid.map_or(0, |grid| grid.column_of(x));

        let moved = self
            .shown_y
            .map_or(false, |shown| (shown - self.line_y).abs() > LINE_TOLERANCE);
        let crossed = !self.line.is_empty() && column != self.line_column;
        if self.break_pending || moved || crossed {
            self.flush();
        } else if self.repositioned {
            // Separately positioned runs on one baseline are separate words.
            self.space();
        }

        if self.line.is_empty() {
            self.line_start = (x, y);
            self.line_column = column;
        }
        self.line.push_str(text);
        self.shown_y = Some(self.line_y);
        self.break_pending = false;
        self.repositioned = false;
    }

    fn space(&mut self) {
        if !self.line.is_empty() && !self.line.ends_with(' ') {
            self.line.push(' ');
        }
    }

    fn flush(&mut self) {
        let line = self.line.trim();
        if !line.is_empty() {
            let (x, y) = self.line_start;
            self.placed.push(Placed {
                x,
                y,
                content: Placement::Text(line.to_string()),
            });
        }
        self.line.clear();
    }

    /// Place an image at the top-left corner of its unit square.
    fn image(&mut self, image: QuestionImage) {
        self.flush();
        let (x, y) = self.ctm.apply(0.0, 1.0);
        self.placed.push(Placed {
            x,
            y,
            content: Placement::Image(image),
        });
    }

    /// Emit the page's lines and images, column by column when reading columns.
    fn finish(mut self, source: &mut SourceDocument) {
        self.flush();
        if let Some(grid) = self.grid {
            self.placed.sort_by(|a, b| {
                grid.column_of(a.x)
                    .cmp(&grid.column_of(b.x))
                    .then(b.y.total_cmp(&a.y))
            });
        }

        for placed in self.placed {
            match placed.content {
                Placement::Text(text) => source.add_text(text),
                Placement::Image(image) => source.add_image(image),
            }
        }
    }
}

fn show_array(lines: &mut LineBuilder, items: &[Object]) {
    for item in items {
        match item {
            Object::String(..) => {
                if let Some(text) = decode_string(item) {
                    lines.show(&text);
                }
            }
            other => {
                if number(other).map_or(false, |n| n < TJ_SPACE_THRESHOLD) {
                    lines.space();
                }
            }
        }
    }
}

fn operand(op: &Operation, index: usize) -> Option<f64> {
    op.operands.get(index).and_then(number)
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Decode a PDF string operand: UTF-16BE with a byte order mark, else Latin-1.
fn decode_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }

    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj)?.as_dict().ok()
}

/// Resource dictionaries visible from a page, nearest first.
fn page_resources(doc: &Document, page_id: ObjectId) -> Vec<&Dictionary> {
    let mut found = Vec::new();
    let mut node = doc.get_dictionary(page_id).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(dict) = node else { break };
        if let Some(resources) = dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
        {
            found.push(resources);
        }
        node = dict.get(b"Parent").ok().and_then(|obj| resolve_dict(doc, obj));
    }

    found
}

/// The page's `MediaBox`, inherited from the page tree when absent.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut node = doc.get_dictionary(page_id).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(dict) = node else { break };
        let corners = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
            .map(|items| items.iter().filter_map(number).collect::<Vec<_>>());
        if let Some(&[x0, y0, x1, y1]) = corners.as_deref() {
            return [x0, y0, x1, y1];
        }
        node = dict.get(b"Parent").ok().and_then(|obj| resolve_dict(doc, obj));
    }

    DEFAULT_MEDIA_BOX
}

/// Look up a named resource (`/Font /F1`, `/XObject /Im1`) in page resources.
fn lookup_resource<'a>(
    doc: &'a Document,
    resources: &[&'a Dictionary],
    category: &[u8],
    name: &[u8],
) -> Option<&'a Object> {
    resources.iter().find_map(|res| {
        let entries = res.get(category).ok().and_then(|obj| resolve_dict(doc, obj))?;
        let entry = entries.get(name).ok()?;
        resolve(doc, entry)
    })
}

fn has_composite_font(doc: &Document, resources: &[&Dictionary]) -> bool {
    resources.iter().any(|res| {
        let Some(fonts) = res.get(b"Font").ok().and_then(|obj| resolve_dict(doc, obj)) else {
            return false;
        };
        fonts.iter().any(|(_, font)| {
            resolve_dict(doc, font)
                .and_then(|f| f.get(b"Subtype").ok())
                .and_then(|s| s.as_name().ok())
                == Some(&b"Type0"[..])
        })
    })
}

/// The image drawn by a `Do` operator; records a warning if it cannot be decoded.
fn place_xobject(
    doc: &Document,
    page: usize,
    op: &Operation,
    resources: &[&Dictionary],
    source: &mut SourceDocument,
) -> Option<QuestionImage> {
    let name = op.operands.first().and_then(|o| o.as_name().ok())?;
    let location = format!("page {} image /{}", page, String::from_utf8_lossy(name));

    let Some(Object::Stream(stream)) = lookup_resource(doc, resources, b"XObject", name) else {
        source.warn(ImageExtractionWarning::new(location, "XObject not found in page resources"));
        return None;
    };

    match stream.dict.get(b"Subtype").and_then(|s| s.as_name()) {
        Ok(b"Image") => {}
        Ok(b"Form") => {
            log::debug!("Ignoring form XObject at {}", location);
            return None;
        }
        _ => {
            source.warn(ImageExtractionWarning::new(location, "XObject is not an image"));
            return None;
        }
    }

    match decode_image(doc, stream) {
        Ok(data) => Some(QuestionImage::new(data)),
        Err(reason) => {
            source.warn(ImageExtractionWarning::new(location, reason));
            None
        }
    }
}

fn stream_filters(doc: &Document, stream: &Stream) -> Vec<Vec<u8>> {
    let Some(filter) = stream
        .dict
        .get(b"Filter")
        .ok()
        .and_then(|obj| resolve(doc, obj))
    else {
        return Vec::new();
    };

    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(|name| name.to_vec())
            .collect(),
        _ => Vec::new(),
    }
}

/// Encoded image bytes (JPEG or PNG) for an image XObject.
fn decode_image(doc: &Document, stream: &Stream) -> std::result::Result<Vec<u8>, String> {
    let filters = stream_filters(doc, stream);
    match filters.as_slice() {
        [] => encode_samples(doc, &stream.dict, &stream.content),
        [f] if f == b"DCTDecode" => Ok(stream.content.clone()),
        [f] if f == b"FlateDecode" => {
            let samples = stream
                .decompressed_content()
                .map_err(|e| format!("failed to inflate image data: {}", e))?;
            encode_samples(doc, &stream.dict, &samples)
        }
        other => {
            let names: Vec<String> = other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            Err(format!("unsupported image encoding {}", names.join("+")))
        }
    }
}

/// Re-encode raw 8-bit RGB or grayscale samples as PNG.
fn encode_samples(
    doc: &Document,
    dict: &Dictionary,
    samples: &[u8],
) -> std::result::Result<Vec<u8>, String> {
    let dimension = |key: &[u8]| {
        dict.get(key)
            .ok()
            .and_then(number)
            .filter(|n| *n > 0.0)
            .map(|n| n as u32)
    };
    let (Some(width), Some(height)) = (dimension(b"Width"), dimension(b"Height")) else {
        return Err("image has no usable Width/Height".to_string());
    };

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(number)
        .unwrap_or(8.0);
    if bits != 8.0 {
        return Err(format!("unsupported {}-bit image samples", bits));
    }

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_name().ok());
    let channels = match color_space {
        Some(b"DeviceRGB") => 3,
        Some(b"DeviceGray") => 1,
        Some(other) => {
            return Err(format!(
                "unsupported color space {}",
                String::from_utf8_lossy(other)
            ))
        }
        None => return Err("unsupported color space".to_string()),
    };

    let expected = (width as usize)
        .checked_mul(height as usize)
        .filter(|&pixels| pixels <= MAX_IMAGE_PIXELS)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| format!("image dimensions too large ({}x{})", width, height))?;
    if samples.len() < expected {
        return Err(format!(
            "image data too short for {}x{} ({} of {} bytes)",
            width,
            height,
            samples.len(),
            expected
        ));
    }
    let samples = samples[..expected].to_vec();

    let image = if channels == 3 {
        RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
    }
    .ok_or_else(|| "image samples do not match dimensions".to_string())?;

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| format!("failed to encode PNG: {}", e))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use mcq_core::{ContentBlock, ImageKind, QuestionExtractor};

    const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn text_ops(lines: &[&str]) -> Vec<Operation> {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                ops.push(Operation::new("Td", vec![0.into(), (-14).into()]));
            }
            ops.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        }
        ops.push(Operation::new("ET", vec![]));
        ops
    }

    fn draw_image() -> Vec<Operation> {
        vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![100.into(), 0.into(), 0.into(), 50.into(), 72.into(), 500.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ]
    }

    fn rgb_image_stream() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![255, 0, 0, 0, 255, 0],
        )
    }

    fn filtered_image_stream(filter: &str, content: Vec<u8>) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => filter,
            },
            content,
        )
    }

    /// Build a PDF whose resources live on the page tree root.
    fn build_pdf(pages: Vec<Vec<Operation>>, image: Option<Stream>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut xobjects = Dictionary::new();
        if let Some(image) = image {
            let image_id = doc.add_object(image);
            xobjects.set("Im1", image_id);
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => xobjects,
        });

        let count = pages.len() as i64;
        let mut kids: Vec<Object> = Vec::new();
        for operations in pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn text(s: &str) -> ContentBlock {
        ContentBlock::Text(s.to_string())
    }

    #[test]
    fn test_lines_and_page_starts() {
        let data = build_pdf(
            vec![
                text_ops(&["1. What is 2+2?", "A. 3", "B. 4"]),
                text_ops(&["2. Capital of France?"]),
            ],
            None,
        );
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();

        assert_eq!(doc.format, SourceFormat::Pdf);
        assert_eq!(doc.page_count, Some(2));
        assert_eq!(
            doc.blocks,
            vec![
                ContentBlock::PageStart(1),
                text("1. What is 2+2?"),
                text("A. 3"),
                text("B. 4"),
                ContentBlock::PageStart(2),
                text("2. Capital of France?"),
            ]
        );
    }

    #[test]
    fn test_runs_on_one_baseline_join() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("1. What")]),
            Operation::new("Td", vec![40.into(), 0.into()]),
            Operation::new("Tj", vec![Object::string_literal("is this?")]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal(" Hello"),
                    (-250).into(),
                    Object::string_literal("world"),
                    10.into(),
                    Object::string_literal("!"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let data = build_pdf(vec![ops], None);
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();
        let lines: Vec<&str> = doc.text_lines().collect();

        assert_eq!(lines, vec!["1. What is this? Hello world!"]);
    }

    #[test]
    fn test_leading_and_quote_operators_break_lines() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("TL", vec![14.into()]),
            Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), 72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("1. Pick one")]),
            Operation::new("T*", vec![]),
            Operation::new("Tj", vec![Object::string_literal("A. left")]),
            Operation::new("'", vec![Object::string_literal("B. right")]),
            Operation::new(
                "\"",
                vec![0.into(), 0.into(), Object::string_literal("C. up")],
            ),
            Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), 72.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("D. down")]),
            Operation::new("ET", vec![]),
        ];
        let data = build_pdf(vec![ops], None);
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();
        let lines: Vec<&str> = doc.text_lines().collect();

        assert_eq!(lines, vec!["1. Pick one", "A. left", "B. right", "C. up", "D. down"]);
    }

    #[test]
    fn test_image_keeps_content_stream_position() {
        let mut ops = text_ops(&["1. Identify the shape"]);
        ops.extend(draw_image());
        ops.extend(text_ops(&["A. circle", "B. square"]));

        let data = build_pdf(vec![ops], Some(rgb_image_stream()));
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();

        assert_eq!(doc.blocks.len(), 5);
        assert_eq!(doc.blocks[1], text("1. Identify the shape"));
        match &doc.blocks[2] {
            ContentBlock::Image(image) => {
                assert_eq!(image.kind, ImageKind::Png);
                let decoded = image::load_from_memory(&image.data).unwrap().to_rgb8();
                assert_eq!(decoded.dimensions(), (2, 1));
                assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);
            }
            other => panic!("expected image, got {:?}", other),
        }
        assert_eq!(doc.blocks[3], text("A. circle"));
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_jpeg_is_passed_through() {
        let mut ops = text_ops(&["1. Photo question"]);
        ops.extend(draw_image());

        let stream = filtered_image_stream("DCTDecode", FAKE_JPEG.to_vec());
        let data = build_pdf(vec![ops], Some(stream));
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();

        match doc.blocks.last() {
            Some(ContentBlock::Image(image)) => {
                assert_eq!(image.kind, ImageKind::Jpeg);
                assert_eq!(image.data, FAKE_JPEG);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_encoding_warns_and_keeps_text() {
        let mut ops = text_ops(&["1. Diagram question"]);
        ops.extend(draw_image());
        ops.extend(text_ops(&["A. yes"]));

        let stream = filtered_image_stream("JPXDecode", vec![0, 0, 0, 12]);
        let data = build_pdf(vec![ops], Some(stream));
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();

        assert_eq!(doc.image_count(), 0);
        assert_eq!(doc.warnings.len(), 1);
        assert_eq!(doc.warnings[0].location, "page 1 image /Im1");
        assert!(doc.warnings[0].reason.contains("JPXDecode"));

        let lines: Vec<&str> = doc.text_lines().collect();
        assert_eq!(lines, vec!["1. Diagram question", "A. yes"]);
    }

    #[test]
    fn test_missing_xobject_warns() {
        let mut ops = text_ops(&["1. Question"]);
        ops.extend(draw_image());

        let data = build_pdf(vec![ops], None);
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();

        assert_eq!(doc.image_count(), 0);
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn test_short_samples_are_rejected() {
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 4,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0; 3],
        );
        let doc = Document::with_version("1.5");
        let err = decode_image(&doc, &stream).unwrap_err();
        assert!(err.contains("too short"));
    }

    #[test]
    fn test_decode_string_utf16() {
        let obj = Object::String(vec![0xFE, 0xFF, 0x00, b'A', 0x00, 0xE9], lopdf::StringFormat::Hexadecimal);
        assert_eq!(decode_string(&obj).as_deref(), Some("Aé"));

        let latin1 = Object::String(vec![b'c', b'a', b'f', 0xE9], lopdf::StringFormat::Literal);
        assert_eq!(decode_string(&latin1).as_deref(), Some("café"));
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        let result = PdfReader::new().read(b"%PDF-1.4 definitely not a pdf", "broken.pdf");
        assert!(matches!(result, Err(Error::PdfError(_))));
    }

    #[test]
    fn test_extracts_questions_with_pages_and_images() {
        let mut page1 = text_ops(&["1. Identify the shape"]);
        page1.extend(draw_image());
        page1.extend(text_ops(&["A. circle", "B. square", "C. triangle"]));
        let page2 = text_ops(&["2. What is 2+2?", "A. 3", "B. 4"]);

        let data = build_pdf(vec![page1, page2], Some(rgb_image_stream()));
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();
        let extraction = QuestionExtractor::default().extract(&doc).unwrap();

        assert_eq!(extraction.questions.len(), 2);
        let first = &extraction.questions[0];
        assert_eq!(first.page, Some(1));
        assert!(first.image.is_some());
        assert_eq!(first.options, vec!["circle", "square", "triangle"]);

        let second = &extraction.questions[1];
        assert_eq!(second.page, Some(2));
        assert!(second.image.is_none());
        assert_eq!(extraction.stats.pages, Some(2));
    }

    fn positioned(x: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    #[test]
    fn test_separate_text_objects_on_one_baseline_are_spaced() {
        let mut ops = positioned(72, 700, "1. Pick");
        ops.extend(positioned(72, 680, "A."));
        ops.extend(positioned(90, 680, "three"));

        let data = build_pdf(vec![ops], None);
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();
        let lines: Vec<&str> = doc.text_lines().collect();
        assert_eq!(lines, vec!["1. Pick", "A. three"]);

        let extraction = QuestionExtractor::default().extract(&doc).unwrap();
        assert_eq!(extraction.questions[0].text, "Pick");
        assert_eq!(extraction.questions[0].options, vec!["three"]);
    }

    /// Two columns drawn row by row, with the right column's figure drawn first.
    fn two_column_page() -> Vec<Operation> {
        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![100.into(), 0.into(), 0.into(), 50.into(), 320.into(), 640.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ];
        for (y, left, right) in [
            (750, "1. Left question", "2. Right question"),
            (730, "A. alpha", "A. gamma"),
            (710, "B. beta", "B. delta"),
        ] {
            ops.extend(positioned(72, y, left));
            ops.extend(positioned(320, y, right));
        }
        ops.extend(positioned(320, 620, "C. epsilon"));
        ops
    }

    #[test]
    fn test_two_columns_are_read_left_then_right() {
        let data = build_pdf(vec![two_column_page()], Some(rgb_image_stream()));
        let doc = PdfReader::new().with_columns(2).read(&data, "quiz.pdf").unwrap();

        assert_eq!(doc.blocks.len(), 9);
        assert_eq!(
            doc.blocks[..5],
            [
                ContentBlock::PageStart(1),
                text("1. Left question"),
                text("A. alpha"),
                text("B. beta"),
                text("2. Right question"),
            ]
        );
        assert_eq!(doc.blocks[5], text("A. gamma"));
        assert_eq!(doc.blocks[6], text("B. delta"));
        assert!(matches!(doc.blocks[7], ContentBlock::Image(_)));
        assert_eq!(doc.blocks[8], text("C. epsilon"));

        let extraction = QuestionExtractor::default().extract(&doc).unwrap();
        assert_eq!(extraction.questions.len(), 2);
        assert_eq!(extraction.questions[0].options, vec!["alpha", "beta"]);
        assert_eq!(extraction.questions[1].text, "Right question");
    }

    #[test]
    fn test_single_column_keeps_stream_order() {
        let data = build_pdf(vec![two_column_page()], Some(rgb_image_stream()));
        let doc = PdfReader::new().read(&data, "quiz.pdf").unwrap();
        let lines: Vec<&str> = doc.text_lines().collect();

        assert_eq!(lines[0], "1. Left question 2. Right question");
        assert!(matches!(doc.blocks[1], ContentBlock::Image(_)));
    }

    #[test]
    fn test_column_of_clamps_to_grid() {
        let grid = ColumnGrid::new([0.0, 0.0, 600.0, 800.0], 2);
        assert_eq!(grid.column_of(-10.0), 0);
        assert_eq!(grid.column_of(299.0), 0);
        assert_eq!(grid.column_of(300.0), 1);
        assert_eq!(grid.column_of(900.0), 1);
    }

    #[test]
    fn test_huge_dimensions_are_rejected() {
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 4294967295i64,
                "Height" => 4294967295i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![0; 12],
        );
        let doc = Document::with_version("1.5");
        let err = decode_image(&doc, &stream).unwrap_err();
        assert!(err.contains("too large"), "{}", err);
    }
}
