//! DOCX table writer.
//!
//! Emits a minimal WordprocessingML package holding one bordered table:
//! a header row followed by one row per question, with the question image
//! embedded inline below the question text.

use mcq_core::{Error, ImageKind, QuestionImage, Result, Table, TableRow};
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{Cursor, Seek, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// English Metric Units per inch.
const EMU_PER_INCH: f64 = 914_400.0;
/// Twentieths of a point per inch.
const TWIPS_PER_INCH: u32 = 1440;

/// Letter paper, in twips.
const PAGE_SHORT_EDGE: u32 = 12_240;
const PAGE_LONG_EDGE: u32 = 15_840;
/// Half-inch margins.
const PAGE_MARGIN: u32 = TWIPS_PER_INCH / 2;

/// Share of the table width given to the question column, in percent.
const QUESTION_COLUMN_PERCENT: u32 = 40;

/// Aspect ratio assumed when an image's dimensions cannot be read.
const FALLBACK_ASPECT: f64 = 0.75;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:eastAsia="Calibri" w:cs="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="0" w:line="240" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style><w:style w:type="table" w:default="1" w:styleId="TableNormal"><w:name w:val="Normal Table"/><w:tblPr><w:tblCellMar><w:top w:w="0" w:type="dxa"/><w:left w:w="108" w:type="dxa"/><w:bottom w:w="0" w:type="dxa"/><w:right w:w="108" w:type="dxa"/></w:tblCellMar></w:tblPr></w:style></w:styles>"#;

/// Writer for the question table document.
#[derive(Debug, Clone)]
pub struct DocxTableWriter {
    /// Landscape page orientation.
    landscape: bool,
    /// Width of embedded question images, in inches.
    image_width_inches: f64,
}

impl Default for DocxTableWriter {
    fn default() -> Self {
        Self {
            landscape: true,
            image_width_inches: 3.0,
        }
    }
}

/// An image placed in the package.
struct EmbeddedImage<'a> {
    rel_id: String,
    part_name: String,
    extension: &'static str,
    content_type: &'static str,
    data: &'a [u8],
    cx: u64,
    cy: u64,
}

impl DocxTableWriter {
    /// Create a writer with landscape pages and 3-inch images.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set landscape (`true`) or portrait (`false`) orientation.
    pub fn with_landscape(mut self, landscape: bool) -> Self {
        self.landscape = landscape;
        self
    }

    /// Set the width of embedded images in inches.
    pub fn with_image_width(mut self, inches: f64) -> Self {
        self.image_width_inches = inches.max(0.25);
        self
    }

    /// Render the table into an in-memory DOCX package.
    pub fn to_bytes(&self, table: &Table<'_>) -> Result<Vec<u8>> {
        Ok(self.write(table, Cursor::new(Vec::new()))?.into_inner())
    }

    /// Render the table as a DOCX package into `writer`.
    pub fn write<W: Write + Seek>(&self, table: &Table<'_>, writer: W) -> Result<W> {
        let images = self.embed_images(table);
        let document_xml = self.document_xml(table, &images)?;

        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let content_types = content_types_xml(&images);
        let document_rels = document_rels_xml(&images);
        let parts: [(&str, &[u8]); 5] = [
            ("[Content_Types].xml", content_types.as_bytes()),
            ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
            ("word/document.xml", document_xml.as_slice()),
            ("word/_rels/document.xml.rels", document_rels.as_bytes()),
            ("word/styles.xml", STYLES_XML.as_bytes()),
        ];
        for (name, content) in parts {
            zip.start_file(name, options).map_err(render_error)?;
            zip.write_all(content).map_err(render_error)?;
        }

        for image in images.iter().flatten() {
            zip.start_file(format!("word/{}", image.part_name), options)
                .map_err(render_error)?;
            zip.write_all(image.data).map_err(render_error)?;
        }

        log::debug!(
            "Wrote DOCX table: {} rows, {} images",
            table.rows.len(),
            images.iter().flatten().count()
        );

        zip.finish().map_err(render_error)
    }

    /// Usable page width between margins, in twips.
    fn text_width(&self) -> u32 {
        let page_width = if self.landscape {
            PAGE_LONG_EDGE
        } else {
            PAGE_SHORT_EDGE
        };
        page_width - 2 * PAGE_MARGIN
    }

    /// Column widths in twips: question column then four option columns.
    fn column_widths(&self) -> [u32; 5] {
        let total = self.text_width();
        let question = total * QUESTION_COLUMN_PERCENT / 100;
        let option = (total - question) / 4;
        [question, option, option, option, option]
    }

    /// Assign package names and display sizes to row images, one slot per row.
    fn embed_images<'a>(&self, table: &Table<'a>) -> Vec<Option<EmbeddedImage<'a>>> {
        // Keep images inside the question cell, leaving room for cell margins.
        let column_inches = f64::from(self.column_widths()[0]) / f64::from(TWIPS_PER_INCH) - 0.2;
        let width_inches = self.image_width_inches.min(column_inches);

        let mut next_index = 1;
        table
            .rows
            .iter()
            .map(|row| {
                let image = row.image?;
                if image.kind == ImageKind::Unknown {
                    log::warn!("Skipping image with unrecognized format");
                    return None;
                }
                let extension = image.kind.extension();

                let aspect = image_aspect(image).unwrap_or(FALLBACK_ASPECT);
                let cx = (width_inches * EMU_PER_INCH).round() as u64;
                let cy = (width_inches * aspect * EMU_PER_INCH).round() as u64;

                let index = next_index;
                next_index += 1;
                Some(EmbeddedImage {
                    rel_id: format!("rId{}", index + 1),
                    part_name: format!("media/image{}.{}", index, extension),
                    extension,
                    content_type: image.kind.mime_type(),
                    data: &image.data,
                    cx,
                    cy,
                })
            })
            .collect()
    }

    fn document_xml(&self, table: &Table<'_>, images: &[Option<EmbeddedImage<'_>>]) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        self.write_document(&mut writer, table, images)
            .map_err(|e| Error::RenderError(format!("Failed to write document.xml: {}", e)))?;
        Ok(writer.into_inner())
    }

    fn write_document(
        &self,
        w: &mut Writer<Vec<u8>>,
        table: &Table<'_>,
        images: &[Option<EmbeddedImage<'_>>],
    ) -> quick_xml::Result<()> {
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let widths = self.column_widths();
        let (page_w, page_h) = if self.landscape {
            (PAGE_LONG_EDGE, PAGE_SHORT_EDGE)
        } else {
            (PAGE_SHORT_EDGE, PAGE_LONG_EDGE)
        };

        w.create_element("w:document")
            .with_attribute(("xmlns:w", NS_W))
            .with_attribute(("xmlns:r", NS_R))
            .with_attribute(("xmlns:wp", NS_WP))
            .with_attribute(("xmlns:a", NS_A))
            .with_attribute(("xmlns:pic", NS_PIC))
            .write_inner_content(|w| {
                w.create_element("w:body").write_inner_content(|w| {
                    w.create_element("w:tbl").write_inner_content(|w| {
                        write_table_properties(w, &widths)?;

                        if let Some(header) = table.header {
                            write_row(w, &widths, &header, None, true)?;
                        }
                        for (row, image) in table.rows.iter().zip(images.iter()) {
                            write_question_row(w, &widths, row, image.as_ref())?;
                        }
                        Ok::<(), quick_xml::Error>(())
                    })?;

                    // A table may not be the last element before the section.
                    w.create_element("w:p").write_empty()?;

                    w.create_element("w:sectPr").write_inner_content(|w| {
                        let mut size = w
                            .create_element("w:pgSz")
                            .with_attribute(("w:w", page_w.to_string().as_str()))
                            .with_attribute(("w:h", page_h.to_string().as_str()));
                        if self.landscape {
                            size = size.with_attribute(("w:orient", "landscape"));
                        }
                        size.write_empty()?;

                        let margin = PAGE_MARGIN.to_string();
                        w.create_element("w:pgMar")
                            .with_attribute(("w:top", margin.as_str()))
                            .with_attribute(("w:right", margin.as_str()))
                            .with_attribute(("w:bottom", margin.as_str()))
                            .with_attribute(("w:left", margin.as_str()))
                            .with_attribute(("w:header", margin.as_str()))
                            .with_attribute(("w:footer", margin.as_str()))
                            .with_attribute(("w:gutter", "0"))
                            .write_empty()?;
                        Ok::<(), quick_xml::Error>(())
                    })?;
                    Ok::<(), quick_xml::Error>(())
                })?;
                Ok::<(), quick_xml::Error>(())
            })?;

        Ok(())
    }
}

fn render_error(e: impl Display) -> Error {
    Error::RenderError(e.to_string())
}

/// Drop characters XML 1.0 does not allow in text.
fn xml_text(text: &str) -> Cow<'_, str> {
    let allowed =
        |c: char| matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{fffe}' && c != '\u{ffff}');
    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

fn write_table_properties(w: &mut Writer<Vec<u8>>, widths: &[u32; 5]) -> quick_xml::Result<()> {
    w.create_element("w:tblPr").write_inner_content(|w| {
        let total: u32 = widths.iter().sum();
        w.create_element("w:tblW")
            .with_attribute(("w:w", total.to_string().as_str()))
            .with_attribute(("w:type", "dxa"))
            .write_empty()?;

        w.create_element("w:tblBorders").write_inner_content(|w| {
            for edge in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
                w.create_element(edge)
                    .with_attribute(("w:val", "single"))
                    .with_attribute(("w:sz", "4"))
                    .with_attribute(("w:space", "0"))
                    .with_attribute(("w:color", "000000"))
                    .write_empty()?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;

        w.create_element("w:tblLayout")
            .with_attribute(("w:type", "fixed"))
            .write_empty()?;
        Ok::<(), quick_xml::Error>(())
    })?;

    w.create_element("w:tblGrid").write_inner_content(|w| {
        for width in widths {
            w.create_element("w:gridCol")
                .with_attribute(("w:w", width.to_string().as_str()))
                .write_empty()?;
        }
        Ok::<(), quick_xml::Error>(())
    })?;

    Ok(())
}

fn write_question_row(
    w: &mut Writer<Vec<u8>>,
    widths: &[u32; 5],
    row: &TableRow<'_>,
    image: Option<&EmbeddedImage<'_>>,
) -> quick_xml::Result<()> {
    write_row(w, widths, &row.cells(), image, false)
}

fn write_row(
    w: &mut Writer<Vec<u8>>,
    widths: &[u32; 5],
    cells: &[&str; 5],
    image: Option<&EmbeddedImage<'_>>,
    header: bool,
) -> quick_xml::Result<()> {
    w.create_element("w:tr").write_inner_content(|w| {
        if header {
            w.create_element("w:trPr").write_inner_content(|w| {
                w.create_element("w:tblHeader").write_empty()?;
                Ok::<(), quick_xml::Error>(())
            })?;
        }

        for (col, (text, width)) in cells.iter().zip(widths.iter()).enumerate() {
            w.create_element("w:tc").write_inner_content(|w| {
                w.create_element("w:tcPr").write_inner_content(|w| {
                    w.create_element("w:tcW")
                        .with_attribute(("w:w", width.to_string().as_str()))
                        .with_attribute(("w:type", "dxa"))
                        .write_empty()?;
                    Ok::<(), quick_xml::Error>(())
                })?;

                write_text_paragraph(w, text, header)?;

                if col == 0 {
                    if let Some(image) = image {
                        w.create_element("w:p").write_inner_content(|w| {
                            w.create_element("w:r").write_inner_content(|w| {
                                write_drawing(w, image)
                            })?;
                            Ok::<(), quick_xml::Error>(())
                        })?;
                    }
                }
                Ok::<(), quick_xml::Error>(())
            })?;
        }
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

fn write_text_paragraph(w: &mut Writer<Vec<u8>>, text: &str, bold: bool) -> quick_xml::Result<()> {
    let text = xml_text(text);
    if text.is_empty() {
        w.create_element("w:p").write_empty()?;
        return Ok(());
    }

    w.create_element("w:p").write_inner_content(|w| {
        w.create_element("w:r").write_inner_content(|w| {
            if bold {
                w.create_element("w:rPr").write_inner_content(|w| {
                    w.create_element("w:b").write_empty()?;
                    Ok::<(), quick_xml::Error>(())
                })?;
            }

            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    w.create_element("w:br").write_empty()?;
                }
                w.create_element("w:t")
                    .with_attribute(("xml:space", "preserve"))
                    .write_text_content(BytesText::new(line))?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

fn write_drawing(w: &mut Writer<Vec<u8>>, image: &EmbeddedImage<'_>) -> quick_xml::Result<()> {
    let cx = image.cx.to_string();
    let cy = image.cy.to_string();
    let id = image.rel_id.trim_start_matches("rId").to_string();
    let name = image.part_name.trim_start_matches("media/").to_string();

    w.create_element("w:drawing").write_inner_content(|w| {
        w.create_element("wp:inline")
            .with_attribute(("distT", "0"))
            .with_attribute(("distB", "0"))
            .with_attribute(("distL", "0"))
            .with_attribute(("distR", "0"))
            .write_inner_content(|w| {
                w.create_element("wp:extent")
                    .with_attribute(("cx", cx.as_str()))
                    .with_attribute(("cy", cy.as_str()))
                    .write_empty()?;
                w.create_element("wp:docPr")
                    .with_attribute(("id", id.as_str()))
                    .with_attribute(("name", name.as_str()))
                    .write_empty()?;
                w.create_element("wp:cNvGraphicFramePr").write_inner_content(|w| {
                    w.create_element("a:graphicFrameLocks")
                        .with_attribute(("noChangeAspect", "1"))
                        .write_empty()?;
                    Ok::<(), quick_xml::Error>(())
                })?;
                w.create_element("a:graphic").write_inner_content(|w| {
                    w.create_element("a:graphicData")
                        .with_attribute(("uri", NS_PIC))
                        .write_inner_content(|w| {
                            w.create_element("pic:pic").write_inner_content(|w| {
                                w.create_element("pic:nvPicPr").write_inner_content(|w| {
                                    w.create_element("pic:cNvPr")
                                        .with_attribute(("id", id.as_str()))
                                        .with_attribute(("name", name.as_str()))
                                        .write_empty()?;
                                    w.create_element("pic:cNvPicPr").write_empty()?;
                                    Ok::<(), quick_xml::Error>(())
                                })?;
                                w.create_element("pic:blipFill").write_inner_content(|w| {
                                    w.create_element("a:blip")
                                        .with_attribute(("r:embed", image.rel_id.as_str()))
                                        .write_empty()?;
                                    w.create_element("a:stretch").write_inner_content(|w| {
                                        w.create_element("a:fillRect").write_empty()?;
                                        Ok::<(), quick_xml::Error>(())
                                    })?;
                                    Ok::<(), quick_xml::Error>(())
                                })?;
                                w.create_element("pic:spPr").write_inner_content(|w| {
                                    w.create_element("a:xfrm").write_inner_content(|w| {
                                        w.create_element("a:off")
                                            .with_attribute(("x", "0"))
                                            .with_attribute(("y", "0"))
                                            .write_empty()?;
                                        w.create_element("a:ext")
                                            .with_attribute(("cx", cx.as_str()))
                                            .with_attribute(("cy", cy.as_str()))
                                            .write_empty()?;
                                        Ok::<(), quick_xml::Error>(())
                                    })?;
                                    w.create_element("a:prstGeom")
                                        .with_attribute(("prst", "rect"))
                                        .write_inner_content(|w| {
                                            w.create_element("a:avLst").write_empty()?;
                                            Ok::<(), quick_xml::Error>(())
                                        })?;
                                    Ok::<(), quick_xml::Error>(())
                                })?;
                                Ok::<(), quick_xml::Error>(())
                            })?;
                            Ok::<(), quick_xml::Error>(())
                        })?;
                    Ok::<(), quick_xml::Error>(())
                })?;
                Ok::<(), quick_xml::Error>(())
            })?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

/// Height-to-width ratio of an encoded image, if its header can be read.
fn image_aspect(image: &QuestionImage) -> Option<f64> {
    let (width, height) = image::io::Reader::new(Cursor::new(&image.data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    (width > 0).then(|| f64::from(height) / f64::from(width))
}

fn content_types_xml(images: &[Option<EmbeddedImage<'_>>]) -> String {
    let defaults: BTreeMap<&str, &str> = images
        .iter()
        .flatten()
        .map(|i| (i.extension, i.content_type))
        .collect();

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#,
    );
    for (ext, content_type) in defaults {
        xml.push_str(&format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            ext, content_type
        ));
    }
    xml.push_str(r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#);
    xml
}

fn document_rels_xml(images: &[Option<EmbeddedImage<'_>>]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{}" Target="styles.xml"/>"#,
        REL_STYLES
    );
    for image in images.iter().flatten() {
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            image.rel_id, REL_IMAGE, image.part_name
        ));
    }
    xml.push_str("</Relationships>");
    xml
}
