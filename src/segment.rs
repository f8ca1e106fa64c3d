/// Course segmentation: split content documents into unit documents.
///
/// A course root holds one or more content documents (`.docx`). Each is
/// scanned for module headings ("Heading 1") and unit headings
/// ("Heading 2"); every unit heading opens a segment that runs up to the
/// next heading of either level. Segments become standalone documents at
/// `<course>/<unit>/<unit>.docx`, and the first content document also
/// feeds the synthetic whole-course unit `mod0_vidint`.
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::ooxml::OoxmlError;
use crate::ooxml::docx::{Block, Docx};
use crate::unit::{UnitDir, UnitId, UnitKind};

pub type Result<T> = std::result::Result<T, SegmentError>;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("document error: {0}")]
    Ooxml(#[from] OoxmlError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

static FIRST_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern"));

/// Heading tokens that mark a practical unit. Anything else is
/// conceptual, which is also the default when no token matches.
const PRACTICAL_TOKENS: [&str; 3] = ["PRÁTICO", "PRATICO", "NP"];

/// Segment every content document of a course.
///
/// Qualifying documents are `*.docx` files at the course root, excluding
/// roteiro sources (`ROT_*`) and tagged copies (`*_tagged.docx`), sorted
/// by name. The first one becomes the whole-course unit; all of them are
/// segmented into per-unit documents. Existing outputs are kept unless
/// `force`.
pub fn segment_course(course_root: &Path, force: bool) -> Result<Vec<UnitDir>> {
    let docs = content_documents(course_root)?;
    if docs.is_empty() {
        tracing::warn!(root = %course_root.display(), "no content documents found");
        return Ok(Vec::new());
    }
    if docs.len() > 1 {
        tracing::warn!(
            count = docs.len(),
            "multiple content documents found, segmenting all of them"
        );
    }
    let mut units = vec![write_whole_course(&docs[0], course_root, force)?];
    for doc in &docs {
        units.extend(segment_document(doc, course_root, force)?);
    }
    Ok(units)
}

/// Split one content document into its unit documents.
pub fn segment_document(
    docx_path: &Path,
    course_root: &Path,
    force: bool,
) -> Result<Vec<UnitDir>> {
    let source = Docx::open(docx_path)?;
    let blocks = source.blocks()?;
    let style_names = source.style_names()?;
    let segments = plan_segments(&blocks, &style_names);
    tracing::info!(
        doc = %docx_path.display(),
        units = segments.len(),
        "planned unit segments"
    );

    let mut units = Vec::with_capacity(segments.len());
    for segment in segments {
        let dir = course_root.join(segment.id.dir_name());
        let output = dir.join(format!("{}.docx", segment.id));
        if output.exists() && !force {
            tracing::info!(unit = %segment.id, "keeping existing unit document");
            units.push(UnitDir {
                id: segment.id,
                dir,
            });
            continue;
        }
        std::fs::create_dir_all(&dir)?;
        let mut unit_doc = Docx::open(docx_path)?;
        unit_doc.blank_headers_footers()?;
        unit_doc.retain_blocks(&blocks, segment.blocks)?;
        unit_doc.save(&output)?;
        tracing::info!(unit = %segment.id, path = %output.display(), "wrote unit document");
        units.push(UnitDir {
            id: segment.id,
            dir,
        });
    }
    Ok(units)
}

fn write_whole_course(docx_path: &Path, course_root: &Path, force: bool) -> Result<UnitDir> {
    let id = UnitId::whole_course();
    let dir = course_root.join(id.dir_name());
    let output = dir.join(format!("{id}.docx"));
    if output.exists() && !force {
        tracing::info!("keeping existing whole-course document");
        return Ok(UnitDir { id, dir });
    }
    std::fs::create_dir_all(&dir)?;
    let mut doc = Docx::open(docx_path)?;
    doc.blank_headers_footers()?;
    doc.save(&output)?;
    tracing::info!(path = %output.display(), "wrote whole-course document");
    Ok(UnitDir { id, dir })
}

fn content_documents(course_root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut docs = Vec::new();
    for entry in std::fs::read_dir(course_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".docx") || name.starts_with("ROT_") || name.ends_with("_tagged.docx")
        {
            continue;
        }
        docs.push(entry.path());
    }
    docs.sort();
    Ok(docs)
}

/// A planned unit segment: identity plus the block index range it keeps.
struct Segment {
    id: UnitId,
    blocks: Range<usize>,
}

/// Walk the block list and turn headings into unit segments.
///
/// Module headings set the module index (explicit first integer, else
/// previous + 1) and reset the per-kind sequence counters. Unit headings
/// open a segment that includes the heading itself; an explicit number
/// fixes the sequence and raises the counter to at least that value, an
/// implicit one takes counter + 1. A unit heading seen before any module
/// heading belongs to module 1.
fn plan_segments(blocks: &[Block], style_names: &BTreeMap<String, String>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut module: Option<u32> = None;
    let mut counts: BTreeMap<UnitKind, u32> = BTreeMap::new();
    let mut open: Option<(UnitId, usize)> = None;

    for (index, block) in blocks.iter().enumerate() {
        let role = block
            .style_id()
            .and_then(|id| style_names.get(id))
            .map(String::as_str);
        match role {
            Some("Heading 1") => {
                if let Some((id, start)) = open.take() {
                    segments.push(Segment {
                        id,
                        blocks: start..index,
                    });
                }
                module = Some(first_int(block.text()).unwrap_or(module.unwrap_or(0) + 1));
                counts.clear();
            }
            Some("Heading 2") => {
                if let Some((id, start)) = open.take() {
                    segments.push(Segment {
                        id,
                        blocks: start..index,
                    });
                }
                let module = *module.get_or_insert(1);
                let kind = infer_kind(block.text());
                let count = counts.entry(kind).or_insert(0);
                let sequence = match first_int(block.text()) {
                    Some(number) => {
                        *count = (*count).max(number);
                        number
                    }
                    None => {
                        *count += 1;
                        *count
                    }
                };
                open = Some((
                    UnitId {
                        module,
                        kind,
                        sequence,
                    },
                    index,
                ));
            }
            _ => {}
        }
    }
    if let Some((id, start)) = open.take() {
        segments.push(Segment {
            id,
            blocks: start..blocks.len(),
        });
    }
    segments
}

fn infer_kind(title: &str) -> UnitKind {
    let upper = title.to_uppercase();
    if PRACTICAL_TOKENS.iter().any(|token| upper.contains(token)) {
        UnitKind::Practical
    } else {
        UnitKind::Conceptual
    }
}

fn first_int(text: &str) -> Option<u32> {
    FIRST_INT.find(text).and_then(|m| m.as_str().parse().ok())
}
