/// Presentation package access and the slide/layout/master graph.
use std::ops::Range;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::{OpcPackage, resolve_target};

use super::rel_type;

/// Part name of the presentation root.
pub const PRESENTATION_PART: &str = "ppt/presentation.xml";

/// One entry of `p:sldIdLst`, resolved to its slide part.
#[derive(Debug, Clone)]
pub struct SlideRef {
    /// The `id` attribute of the `p:sldId` entry.
    pub slide_id: u32,
    /// The `r:id` attribute pointing into the presentation rels.
    pub rel_id: String,
    /// Resolved slide part name (`ppt/slides/slide1.xml`).
    pub part_name: String,
}

/// A presentation backed by an in-memory OPC package.
pub struct Pptx {
    pkg: OpcPackage,
}

impl Pptx {
    /// Open a presentation from a file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            pkg: OpcPackage::open(path)?,
        })
    }

    /// Load a presentation from archive bytes.
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

    /// Slides in presentation order.
    pub fn slides(&self) -> Result<Vec<SlideRef>> {
        let info = scan_presentation(self.pkg.part(PRESENTATION_PART)?)?;
        let rels = self.pkg.relationships(PRESENTATION_PART)?;
        let mut slides = Vec::with_capacity(info.slides.len());
        for entry in info.slides {
            let rel = rels
                .iter()
                .find(|r| r.id == entry.rel_id)
                .ok_or_else(|| {
                    OoxmlError::InvalidRelationship(format!(
                        "slide id {} references unknown relationship {}",
                        entry.id, entry.rel_id
                    ))
                })?;
            slides.push(SlideRef {
                slide_id: entry.id,
                rel_id: entry.rel_id,
                part_name: resolve_target(PRESENTATION_PART, &rel.target),
            });
        }
        Ok(slides)
    }

    /// Layout part backing a slide.
    pub fn slide_layout(&self, slide_part: &str) -> Result<String> {
        self.related_part(slide_part, rel_type::SLIDE_LAYOUT)
    }

    /// Master part backing a layout.
    pub fn layout_master(&self, layout_part: &str) -> Result<String> {
        self.related_part(layout_part, rel_type::SLIDE_MASTER)
    }

    /// All layout part names in the package, in numeric order.
    pub fn layout_parts(&self) -> Vec<String> {
        let mut layouts: Vec<(u32, String)> = self
            .pkg
            .part_names()
            .filter_map(|name| {
                let file = name.strip_prefix("ppt/slideLayouts/slideLayout")?;
                let number: u32 = file.strip_suffix(".xml")?.parse().ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        layouts.sort_by_key(|(number, _)| *number);
        layouts.into_iter().map(|(_, name)| name).collect()
    }

    /// Slide size in EMUs from `p:sldSz`.
    pub fn slide_size(&self) -> Result<(i64, i64)> {
        let info = scan_presentation(self.pkg.part(PRESENTATION_PART)?)?;
        info.slide_size.ok_or_else(|| {
            OoxmlError::InvalidFormat("presentation has no p:sldSz".to_string())
        })
    }

    /// Write the presentation to a file on disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.pkg.save(path)
    }

    fn related_part(&self, part: &str, wanted_type: &str) -> Result<String> {
        let rels = self.pkg.relationships(part)?;
        let rel = rels
            .iter()
            .find(|r| r.rel_type == wanted_type && !r.external)
            .ok_or_else(|| {
                OoxmlError::InvalidRelationship(format!(
                    "{part} has no {wanted_type} relationship"
                ))
            })?;
        Ok(resolve_target(part, &rel.target))
    }
}

/// Structural scan of `ppt/presentation.xml` used by both the read model
/// and the composer.
pub(super) struct PresentationInfo {
    pub slides: Vec<SlideIdEntry>,
    /// Byte offset where new `p:sldId` entries are inserted (start of
    /// `</p:sldIdLst>`). `None` when the list element is empty or absent.
    pub sld_id_lst_insert: Option<usize>,
    /// Byte range of an empty `<p:sldIdLst/>` element, when present.
    pub empty_sld_id_lst: Option<Range<usize>>,
    pub slide_size: Option<(i64, i64)>,
}

/// A `p:sldId` entry with its byte range, for deletion splices.
pub(super) struct SlideIdEntry {
    pub id: u32,
    pub rel_id: String,
    pub range: Range<usize>,
}

pub(super) fn scan_presentation(xml: &[u8]) -> Result<PresentationInfo> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);

    let mut info = PresentationInfo {
        slides: Vec::new(),
        sld_id_lst_insert: None,
        empty_sld_id_lst: None,
        slide_size: None,
    };
    let mut open_sld_id: Option<(usize, u32, String)> = None;

    loop {
        let pre = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let post = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"sldId" {
                    if let Some((id, rel_id)) = sld_id_attrs(e) {
                        open_sld_id = Some((pre, id, rel_id));
                    }
                }
            }
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"sldId" => {
                    if let Some((id, rel_id)) = sld_id_attrs(e) {
                        info.slides.push(SlideIdEntry {
                            id,
                            rel_id,
                            range: pre..post,
                        });
                    }
                }
                b"sldIdLst" => {
                    info.empty_sld_id_lst = Some(pre..post);
                }
                b"sldSz" => {
                    let mut cx = None;
                    let mut cy = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"cx" => cx = parse_i64(&attr.value),
                            b"cy" => cy = parse_i64(&attr.value),
                            _ => {}
                        }
                    }
                    if let (Some(cx), Some(cy)) = (cx, cy) {
                        info.slide_size = Some((cx, cy));
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"sldId" => {
                    if let Some((start, id, rel_id)) = open_sld_id.take() {
                        info.slides.push(SlideIdEntry {
                            id,
                            rel_id,
                            range: start..post,
                        });
                    }
                }
                b"sldIdLst" => {
                    info.sld_id_lst_insert = Some(pre);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(info)
}

fn sld_id_attrs(e: &quick_xml::events::BytesStart<'_>) -> Option<(u32, String)> {
    let mut id = None;
    let mut rel_id = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"id" => {
                id = String::from_utf8_lossy(&attr.value).parse::<u32>().ok();
            }
            b"r:id" => {
                rel_id = Some(String::from_utf8_lossy(&attr.value).into_owned());
            }
            _ => {}
        }
    }
    match (id, rel_id) {
        (Some(id), Some(rel_id)) => Some((id, rel_id)),
        _ => None,
    }
}

pub(super) fn parse_i64(raw: &[u8]) -> Option<i64> {
    String::from_utf8_lossy(raw).parse::<i64>().ok()
}
