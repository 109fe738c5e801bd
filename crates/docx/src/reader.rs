//! DOCX file reader implementation.

use mcq_core::{Error, ImageExtractionWarning, ImageKind, QuestionImage, Result, SourceDocument, SourceFormat};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

const DOCUMENT_PATH: &str = "word/document.xml";
const DOCUMENT_RELS_PATH: &str = "word/_rels/document.xml.rels";

/// Reader for DOCX (Office Open XML) files.
pub struct DocxReader;

impl DocxReader {
    /// Create a new DOCX reader.
    pub fn new() -> Self {
        Self
    }

    /// Read a DOCX file into text lines and positioned images.
    pub fn read<R: Read + Seek>(&self, reader: R, filename: &str) -> Result<SourceDocument> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        if archive.by_name(DOCUMENT_PATH).is_err() {
            return Err(Error::UnsupportedFileType(format!(
                "'{}' is a ZIP archive without {} (not a Word document)",
                filename, DOCUMENT_PATH
            )));
        }

        let mut doc = SourceDocument::new(filename, SourceFormat::Docx);

        let relationships = match self.read_file_from_archive(&mut archive, DOCUMENT_RELS_PATH) {
            Ok(content) => parse_relationships(&content)?,
            Err(e) => {
                log::debug!("No document relationships ({}); images will be skipped", e);
                HashMap::new()
            }
        };

        let content = self.read_file_from_archive(&mut archive, DOCUMENT_PATH)?;
        let blocks = self.extract_blocks_from_xml(&content)?;

        for block in blocks {
            match block {
                BodyBlock::Line(line) => doc.add_text(line),
                BodyBlock::ImageRef(rel_id) => {
                    match self.load_image(&mut archive, &relationships, &rel_id) {
                        Ok(image) => doc.add_image(image),
                        Err(reason) => doc.warn(ImageExtractionWarning::new(
                            format!("relationship {}", rel_id),
                            reason,
                        )),
                    }
                }
            }
        }

        log::debug!(
            "DOCX '{}': {} blocks, {} images, {} warnings",
            filename,
            doc.blocks.len(),
            doc.image_count(),
            doc.warnings.len()
        );

        Ok(doc)
    }

    /// Resolve an image relationship and read its bytes.
    fn load_image<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        relationships: &HashMap<String, String>,
        rel_id: &str,
    ) -> std::result::Result<QuestionImage, String> {
        let path = relationships
            .get(rel_id)
            .ok_or_else(|| "relationship not found".to_string())?;

        let data = self
            .read_bytes_from_archive(archive, path)
            .map_err(|e| e.to_string())?;

        let image = QuestionImage::new(data);
        if image.kind == ImageKind::Unknown {
            return Err(format!("unrecognized image format in '{}'", path));
        }
        Ok(image)
    }

    /// Walk the document body, producing paragraph lines and image references
    /// in document order.
    fn extract_blocks_from_xml(&self, xml_content: &str) -> Result<Vec<BodyBlock>> {
        let mut blocks = Vec::new();
        let mut reader = Reader::from_str(xml_content);
        // Run text keeps its own spacing.
        reader.trim_text(false);

        let mut paragraph_depth = 0usize;
        let mut seen_content = false;
        let mut in_text = false;
        let mut current_line = String::new();
        let mut pending_images: Vec<String> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"p" => {
                            seen_content = true;
                            // Nested paragraphs (text boxes) end the outer line.
                            if paragraph_depth > 0 {
                                flush_line(&mut current_line, &mut blocks);
                            }
                            paragraph_depth += 1;
                        }
                        b"t" => in_text = true,
                        b"blip" | b"imagedata" => {
                            if let Some(id) = image_rel_id(e) {
                                pending_images.push(id);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"tab" if paragraph_depth > 0 => current_line.push('\t'),
                        b"br" | b"cr" if paragraph_depth > 0 => {
                            flush_line(&mut current_line, &mut blocks);
                        }
                        b"blip" | b"imagedata" => {
                            if let Some(id) = image_rel_id(e) {
                                pending_images.push(id);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if in_text {
                        let text = e.unescape().unwrap_or_default();
                        current_line.push_str(&text);
                    }
                }
                Ok(Event::End(ref e)) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"t" => in_text = false,
                        b"p" => {
                            flush_line(&mut current_line, &mut blocks);
                            paragraph_depth = paragraph_depth.saturating_sub(1);
                            if paragraph_depth == 0 {
                                blocks.extend(pending_images.drain(..).map(BodyBlock::ImageRef));
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) if !seen_content => {
                    return Err(Error::DocxError(format!(
                        "{} is not well-formed: {}",
                        DOCUMENT_PATH, e
                    )));
                }
                Err(e) => {
                    log::warn!(
                        "XML parsing error at position {} (stopping): {}",
                        reader.buffer_position(),
                        e
                    );
                    break;
                }
                _ => {}
            }
        }

        flush_line(&mut current_line, &mut blocks);
        blocks.extend(pending_images.drain(..).map(BodyBlock::ImageRef));

        Ok(blocks)
    }

    /// Read a text file from the ZIP archive.
    fn read_file_from_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        path: &str,
    ) -> Result<String> {
        let mut file = archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::DocxError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }

    /// Read a binary file from the ZIP archive.
    fn read_bytes_from_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        path: &str,
    ) -> Result<Vec<u8>> {
        let mut file = archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        // The declared size is untrusted; let the buffer grow with the data.
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(data)
    }
}

impl Default for DocxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of body content before image resolution.
#[derive(Debug, Clone, PartialEq)]
enum BodyBlock {
    Line(String),
    ImageRef(String),
}

fn flush_line(current: &mut String, blocks: &mut Vec<BodyBlock>) {
    if !current.trim().is_empty() {
        blocks.push(BodyBlock::Line(current.trim().to_string()));
    }
    current.clear();
}

/// The relationship id of an `a:blip` (`r:embed`) or `v:imagedata` (`r:id`).
fn image_rel_id(e: &BytesStart) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        let key = attr.key.as_ref();
        let is_rel = key.starts_with(b"r:") && matches!(local_name(key), b"embed" | b"id");
        is_rel.then(|| String::from_utf8_lossy(&attr.value).to_string())
    })
}

/// Parse `document.xml.rels` into a map of relationship id to archive path.
fn parse_relationships(content: &str) -> Result<HashMap<String, String>> {
    let mut rels = HashMap::new();
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut id = String::new();
                let mut target = String::new();
                let mut external = false;

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                        b"TargetMode" => external = attr.value.as_ref() == b"External",
                        _ => {}
                    }
                }

                if !id.is_empty() && !target.is_empty() && !external {
                    rels.insert(id, resolve_target("word", &target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}
