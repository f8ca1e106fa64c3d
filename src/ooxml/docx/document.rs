/// Word document access: package wrapper and top-level block scan.
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::{OpcPackage, resolve_target};
use crate::ooxml::splice;

use super::image::{self, ImageRun};
use super::rewrite;
use super::styles;

/// Part name of the main document story.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Part name of the styles part.
pub const STYLES_PART: &str = "word/styles.xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// A top-level block of the document body.
///
/// `range` is the half-open byte range of the whole element inside
/// `word/document.xml`, suitable for splicing.
#[derive(Debug, Clone)]
pub enum Block {
    /// A `<w:p>` directly under `<w:body>`.
    Paragraph {
        /// `w:pStyle` value, when present.
        style_id: Option<String>,
        /// Concatenated `<w:t>` text of the paragraph.
        text: String,
        range: Range<usize>,
    },
    /// A `<w:tbl>` directly under `<w:body>`.
    Table { range: Range<usize> },
}

impl Block {
    /// Byte range of the block inside the document part.
    pub fn range(&self) -> Range<usize> {
        match self {
            Block::Paragraph { range, .. } | Block::Table { range } => range.clone(),
        }
    }

    /// Paragraph style id, `None` for tables and unstyled paragraphs.
    pub fn style_id(&self) -> Option<&str> {
        match self {
            Block::Paragraph { style_id, .. } => style_id.as_deref(),
            Block::Table { .. } => None,
        }
    }

    /// Paragraph text, empty for tables.
    pub fn text(&self) -> &str {
        match self {
            Block::Paragraph { text, .. } => text,
            Block::Table { .. } => "",
        }
    }
}

/// A Word document backed by an in-memory OPC package.
pub struct Docx {
    pkg: OpcPackage,
}

impl Docx {
    /// Open a document from a file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            pkg: OpcPackage::open(path)?,
        })
    }

    /// Load a document from archive bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            pkg: OpcPackage::from_bytes(bytes)?,
        })
    }

    /// The underlying package.
    #[inline]
    pub fn package(&self) -> &OpcPackage {
        &self.pkg
    }

    /// The underlying package, mutable.
    #[inline]
    pub fn package_mut(&mut self) -> &mut OpcPackage {
        &mut self.pkg
    }

    /// Bytes of `word/document.xml`.
    pub fn document_xml(&self) -> Result<&[u8]> {
        self.pkg.part(DOCUMENT_PART)
    }

    /// Replace `word/document.xml`.
    pub fn set_document_xml(&mut self, xml: Vec<u8>) {
        self.pkg.set_part(DOCUMENT_PART, xml);
    }

    /// Scan the document body into its top-level blocks, in order.
    pub fn blocks(&self) -> Result<Vec<Block>> {
        scan_blocks(self.document_xml()?)
    }

    /// Style id → display name table from the styles part.
    ///
    /// Returns an empty table when the document carries no styles part.
    pub fn style_names(&self) -> Result<BTreeMap<String, String>> {
        match self.pkg.part_opt(STYLES_PART) {
            Some(xml) => styles::style_names(xml),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Runs of the main document story that reference embedded images.
    pub fn image_runs(&self) -> Result<Vec<ImageRun>> {
        image::image_runs(self.document_xml()?)
    }

    /// Resolve an image relationship id of the document part to the
    /// image bytes and their content type.
    pub fn image_data(&self, rel_id: &str) -> Result<(Vec<u8>, String)> {
        let rels = self.pkg.relationships(DOCUMENT_PART)?;
        let rel = rels
            .iter()
            .find(|r| r.id == rel_id && r.rel_type == IMAGE_REL_TYPE && !r.external)
            .ok_or_else(|| {
                OoxmlError::InvalidRelationship(format!("no image relationship {rel_id}"))
            })?;
        let part_name = resolve_target(DOCUMENT_PART, &rel.target);
        let bytes = self.pkg.part(&part_name)?.to_vec();
        let content_type = self
            .pkg
            .content_types()?
            .content_type_of(&part_name)
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok((bytes, content_type))
    }

    /// Keep only the body blocks with indices in `keep`, removing the
    /// rest. Non-block body content such as `w:sectPr` is preserved.
    pub fn retain_blocks(&mut self, blocks: &[Block], keep: Range<usize>) -> Result<()> {
        let removals: Vec<(Range<usize>, Vec<u8>)> = blocks
            .iter()
            .enumerate()
            .filter(|(index, _)| !keep.contains(index))
            .map(|(_, block)| (block.range(), Vec::new()))
            .collect();
        let rewritten = splice(self.document_xml()?, &removals);
        self.set_document_xml(rewritten);
        Ok(())
    }

    /// Blank every header and footer part. Returns how many parts were
    /// rewritten.
    pub fn blank_headers_footers(&mut self) -> Result<usize> {
        rewrite::blank_headers_footers(&mut self.pkg)
    }

    /// Write the document to a file on disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.pkg.save(path)
    }
}

/// Single streaming pass over the document body.
///
/// Depth 2 in the element stack is the child level of `<w:body>`; only
/// `<w:p>` and `<w:tbl>` opened there become blocks, so paragraphs inside
/// table cells stay part of their table's range.
fn scan_blocks(xml: &[u8]) -> Result<Vec<Block>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);

    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<OpenBlock> = None;
    let mut in_text = false;

    loop {
        let pre = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let post = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) => {
                if open.is_none() && depth == 2 {
                    match e.name().as_ref() {
                        b"w:p" => {
                            open = Some(OpenBlock::paragraph(pre));
                        }
                        b"w:tbl" => {
                            open = Some(OpenBlock::table(pre));
                        }
                        _ => {}
                    }
                } else if let Some(ref mut block) = open {
                    if !block.is_table {
                        if e.name().as_ref() == b"w:t" {
                            in_text = true;
                        } else if e.local_name().as_ref() == b"pStyle" {
                            block.style_id = style_attr(e);
                        }
                    }
                }
                depth += 1;
            }
            Ok(Event::Empty(ref e)) => {
                if open.is_none() && depth == 2 && e.name().as_ref() == b"w:p" {
                    blocks.push(Block::Paragraph {
                        style_id: None,
                        text: String::new(),
                        range: pre..post,
                    });
                } else if let Some(ref mut block) = open {
                    if !block.is_table && e.local_name().as_ref() == b"pStyle" {
                        block.style_id = style_attr(e);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text {
                    if let Some(ref mut block) = open {
                        block.text.push_str(&decode_text(e.as_ref()));
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == b"w:t" {
                    in_text = false;
                }
                if depth == 2 {
                    if let Some(block) = open.take() {
                        blocks.push(block.finish(post));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(blocks)
}

struct OpenBlock {
    start: usize,
    is_table: bool,
    style_id: Option<String>,
    text: String,
}

impl OpenBlock {
    fn paragraph(start: usize) -> Self {
        Self {
            start,
            is_table: false,
            style_id: None,
            text: String::new(),
        }
    }

    fn table(start: usize) -> Self {
        Self {
            start,
            is_table: true,
            style_id: None,
            text: String::new(),
        }
    }

    fn finish(self, end: usize) -> Block {
        if self.is_table {
            Block::Table {
                range: self.start..end,
            }
        } else {
            Block::Paragraph {
                style_id: self.style_id,
                text: self.text,
                range: self.start..end,
            }
        }
    }
}

fn style_attr(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"val" {
            return Some(decode_text(&attr.value));
        }
    }
    None
}

pub(super) fn decode_text(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    quick_xml::escape::unescape(&text)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| text.into_owned())
}
