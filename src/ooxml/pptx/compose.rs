/// Presentation composition: slide deletion, slide instantiation from a
/// layout, placeholder text fill and picture insertion.
///
/// Every mutation re-reads the affected part, computes byte-range
/// replacements and splices them in, leaving the rest of the part
/// untouched.
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::{Relationship, resolve_target};
use crate::ooxml::splice;

use super::presentation::{Pptx, PRESENTATION_PART, scan_presentation};
use super::slide::{PlaceholderRef, find_placeholder, pictures, placeholders};
use super::{SLIDE_CONTENT_TYPE, rel_type};

const SLIDE_NS: &[u8] = br#" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

const BLANK_TXBODY: &[u8] = b"<p:txBody><a:bodyPr/><a:lstStyle/><a:p/></p:txBody>";

/// One run of text with optional fixed-width styling.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub text: String,
    /// Latin typeface name, when the run forces one.
    pub font: Option<String>,
    /// Font size in hundredths of a point (`1600` = 16 pt).
    pub size_hundredths: Option<u32>,
}

impl RunSpec {
    /// A run inheriting the placeholder's formatting.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: None,
            size_hundredths: None,
        }
    }

    /// A run with an explicit typeface and size.
    pub fn styled(text: impl Into<String>, font: impl Into<String>, size_hundredths: u32) -> Self {
        Self {
            text: text.into(),
            font: Some(font.into()),
            size_hundredths: Some(size_hundredths),
        }
    }
}

/// One paragraph of a placeholder text body.
#[derive(Debug, Clone)]
pub struct ParagraphSpec {
    pub runs: Vec<RunSpec>,
}

impl ParagraphSpec {
    /// A paragraph with a single plain run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            runs: vec![RunSpec::plain(text)],
        }
    }

    /// An empty paragraph (blank line).
    pub fn empty() -> Self {
        Self { runs: Vec::new() }
    }
}

impl Pptx {
    /// Remove a slide: its `p:sldId` entry, its presentation
    /// relationship, the slide part and rels, and its content-type
    /// override.
    pub fn delete_slide(&mut self, slide_part: &str) -> Result<()> {
        let rels = self.package().relationships(PRESENTATION_PART)?;
        let rel = rels
            .iter()
            .find(|r| resolve_target(PRESENTATION_PART, &r.target) == slide_part)
            .ok_or_else(|| {
                OoxmlError::InvalidRelationship(format!(
                    "{slide_part} is not referenced by the presentation"
                ))
            })?;
        let rel_id = rel.id.clone();

        let presentation = self.package().part(PRESENTATION_PART)?;
        let info = scan_presentation(presentation)?;
        let entry = info
            .slides
            .iter()
            .find(|entry| entry.rel_id == rel_id)
            .ok_or_else(|| {
                OoxmlError::InvalidFormat(format!("{slide_part} missing from p:sldIdLst"))
            })?;
        let rewritten = splice(presentation, &[(entry.range.clone(), Vec::new())]);
        self.package_mut().set_part(PRESENTATION_PART, rewritten);

        let remaining: Vec<Relationship> =
            rels.into_iter().filter(|r| r.id != rel_id).collect();
        self.package_mut()
            .set_relationships(PRESENTATION_PART, &remaining);

        self.package_mut().remove_part(slide_part);
        let slide_rels = crate::ooxml::opc::rels_part_name(slide_part);
        self.package_mut().remove_part(&slide_rels);

        let mut types = self.package().content_types()?;
        types.remove_override(slide_part);
        self.package_mut().set_content_types(&types);
        Ok(())
    }

    /// Instantiate a new slide at the end of the deck from a layout:
    /// its placeholder shapes are cloned with blanked text bodies.
    /// Returns the new slide part name.
    pub fn add_slide_from_layout(&mut self, layout_part: &str) -> Result<String> {
        let layout_xml = self.package().part(layout_part)?.to_vec();
        let layout_placeholders = placeholders(&layout_xml)?;

        let mut shapes = Vec::new();
        for ph in &layout_placeholders {
            let sp = &layout_xml[ph.range.clone()];
            match &ph.txbody_range {
                Some(txbody) => {
                    let relative =
                        (txbody.start - ph.range.start)..(txbody.end - ph.range.start);
                    shapes.extend_from_slice(&splice(
                        sp,
                        &[(relative, BLANK_TXBODY.to_vec())],
                    ));
                }
                None => shapes.extend_from_slice(sp),
            }
        }

        let mut slide_xml =
            Vec::with_capacity(shapes.len() + SLIDE_NS.len() + 512);
        slide_xml.extend_from_slice(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        );
        slide_xml.extend_from_slice(b"<p:sld");
        slide_xml.extend_from_slice(SLIDE_NS);
        slide_xml.extend_from_slice(b"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>");
        slide_xml.extend_from_slice(&shapes);
        slide_xml.extend_from_slice(
            b"</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>",
        );

        let number = max_numbered(self.package().part_names(), "ppt/slides/slide") + 1;
        let slide_part = format!("ppt/slides/slide{number}.xml");
        self.package_mut().set_part(&slide_part, slide_xml);

        let layout_file = layout_part.rsplit('/').next().unwrap_or(layout_part);
        self.package_mut().set_relationships(
            &slide_part,
            &[Relationship {
                id: "rId1".to_string(),
                rel_type: rel_type::SLIDE_LAYOUT.to_string(),
                target: format!("../slideLayouts/{layout_file}"),
                external: false,
            }],
        );

        let mut types = self.package().content_types()?;
        types.set_override(&slide_part, SLIDE_CONTENT_TYPE);
        self.package_mut().set_content_types(&types);

        self.register_slide(&slide_part)?;
        Ok(slide_part)
    }

    /// Replace the text body of a placeholder on a slide.
    pub fn set_placeholder_text(
        &mut self,
        slide_part: &str,
        by: &PlaceholderRef,
        paragraphs: &[ParagraphSpec],
    ) -> Result<()> {
        let xml = self.package().part(slide_part)?;
        let phs = placeholders(xml)?;
        let ph = find_placeholder(&phs, by).ok_or_else(|| {
            OoxmlError::InvalidFormat(format!("{slide_part} has no placeholder {by:?}"))
        })?;
        let txbody = ph.txbody_range.clone().ok_or_else(|| {
            OoxmlError::InvalidFormat(format!(
                "placeholder {:?} on {slide_part} has no text body",
                ph.name
            ))
        })?;
        let rewritten = splice(xml, &[(txbody, build_txbody(paragraphs))]);
        self.package_mut().set_part(slide_part, rewritten);
        Ok(())
    }

    /// Add an image part and a `p:pic` shape filling `bounds`
    /// (`x, y, cx, cy` in EMUs) on a slide.
    pub fn insert_picture(
        &mut self,
        slide_part: &str,
        image: Vec<u8>,
        extension: &str,
        content_type: &str,
        bounds: (i64, i64, i64, i64),
    ) -> Result<()> {
        let number = max_numbered(self.package().part_names(), "ppt/media/image") + 1;
        let media_part = format!("ppt/media/image{number}.{extension}");
        self.package_mut().set_part(&media_part, image);

        let mut types = self.package().content_types()?;
        types.ensure_default(extension, content_type);
        self.package_mut().set_content_types(&types);

        let mut rels = self.package().relationships(slide_part)?;
        let rel_id = format!("rId{}", next_rel_number(&rels) + 1);
        rels.push(Relationship {
            id: rel_id.clone(),
            rel_type: rel_type::IMAGE.to_string(),
            target: format!("../media/image{number}.{extension}"),
            external: false,
        });
        self.package_mut().set_relationships(slide_part, &rels);

        let xml = self.package().part(slide_part)?;
        let shape_id = max_shape_id(xml)? + 1;
        let insert_at = sp_tree_end(xml)?;
        let (x, y, cx, cy) = bounds;
        let pic = format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{shape_id}" name="Picture {shape_id}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#
        );
        let rewritten = splice(xml, &[(insert_at..insert_at, pic.into_bytes())]);
        self.package_mut().set_part(slide_part, rewritten);
        Ok(())
    }

    /// The largest embedded picture of a slide, by shape area. Returns
    /// the image bytes and their file extension.
    pub fn largest_picture(&self, slide_part: &str) -> Result<Option<(Vec<u8>, String)>> {
        let xml = self.package().part(slide_part)?;
        let pics = pictures(xml)?;
        let Some(pic) = pics
            .iter()
            .filter(|p| p.rel_id.is_some())
            .max_by_key(|p| p.area())
        else {
            return Ok(None);
        };
        let rel_id = pic.rel_id.as_deref().unwrap_or_default();
        let rels = self.package().relationships(slide_part)?;
        let rel = rels
            .iter()
            .find(|r| r.id == rel_id && !r.external)
            .ok_or_else(|| {
                OoxmlError::InvalidRelationship(format!(
                    "{slide_part} picture references unknown relationship {rel_id}"
                ))
            })?;
        let media_part = resolve_target(slide_part, &rel.target);
        let bytes = self.package().part(&media_part)?.to_vec();
        let extension = media_part
            .rsplit('.')
            .next()
            .unwrap_or("png")
            .to_ascii_lowercase();
        Ok(Some((bytes, extension)))
    }

    /// Append a `p:sldId` entry and presentation relationship for a
    /// freshly added slide part.
    fn register_slide(&mut self, slide_part: &str) -> Result<()> {
        let mut rels = self.package().relationships(PRESENTATION_PART)?;
        let rel_id = format!("rId{}", next_rel_number(&rels) + 1);
        let target = slide_part
            .strip_prefix("ppt/")
            .unwrap_or(slide_part)
            .to_string();
        rels.push(Relationship {
            id: rel_id.clone(),
            rel_type: rel_type::SLIDE.to_string(),
            target,
            external: false,
        });

        let presentation = self.package().part(PRESENTATION_PART)?;
        let info = scan_presentation(presentation)?;
        let slide_id = info
            .slides
            .iter()
            .map(|entry| entry.id)
            .max()
            .unwrap_or(255)
            .max(255)
            + 1;
        let entry = format!(r#"<p:sldId id="{slide_id}" r:id="{rel_id}"/>"#);
        let rewritten = if let Some(insert) = info.sld_id_lst_insert {
            splice(presentation, &[(insert..insert, entry.into_bytes())])
        } else if let Some(empty) = info.empty_sld_id_lst {
            let full = format!("<p:sldIdLst>{entry}</p:sldIdLst>");
            splice(presentation, &[(empty, full.into_bytes())])
        } else {
            return Err(OoxmlError::InvalidFormat(
                "presentation has no p:sldIdLst".to_string(),
            ));
        };
        self.package_mut().set_part(PRESENTATION_PART, rewritten);
        self.package_mut()
            .set_relationships(PRESENTATION_PART, &rels);
        Ok(())
    }
}

fn build_txbody(paragraphs: &[ParagraphSpec]) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(b"<p:txBody><a:bodyPr/><a:lstStyle/>");
    if paragraphs.is_empty() {
        out.extend_from_slice(b"<a:p/>");
    }
    for para in paragraphs {
        if para.runs.is_empty() {
            out.extend_from_slice(b"<a:p/>");
            continue;
        }
        out.extend_from_slice(b"<a:p>");
        for run in &para.runs {
            out.extend_from_slice(b"<a:r>");
            if run.font.is_some() || run.size_hundredths.is_some() {
                out.extend_from_slice(b"<a:rPr");
                if let Some(size) = run.size_hundredths {
                    out.extend_from_slice(format!(" sz=\"{size}\"").as_bytes());
                }
                out.push(b'>');
                if let Some(font) = &run.font {
                    out.extend_from_slice(b"<a:latin typeface=\"");
                    out.extend_from_slice(quick_xml::escape::escape(font.as_str()).as_bytes());
                    out.extend_from_slice(b"\"/>");
                }
                out.extend_from_slice(b"</a:rPr>");
            }
            out.extend_from_slice(b"<a:t>");
            out.extend_from_slice(quick_xml::escape::escape(run.text.as_str()).as_bytes());
            out.extend_from_slice(b"</a:t></a:r>");
        }
        out.extend_from_slice(b"</a:p>");
    }
    out.extend_from_slice(b"</p:txBody>");
    out
}

/// Highest `N` among part names shaped `<prefix>N...`, 0 when none match.
fn max_numbered<'a>(names: impl Iterator<Item = &'a str>, prefix: &str) -> u32 {
    names
        .filter_map(|name| {
            let rest = name.strip_prefix(prefix)?;
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
}

fn next_rel_number(rels: &[Relationship]) -> u32 {
    rels.iter()
        .filter_map(|rel| rel.id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

/// Highest `p:cNvPr` id in a part.
fn max_shape_id(xml: &[u8]) -> Result<u32> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);
    let mut max_id = 1u32;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"cNvPr" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"id" {
                            if let Ok(id) =
                                String::from_utf8_lossy(&attr.value).parse::<u32>()
                            {
                                max_id = max_id.max(id);
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(max_id)
}

/// Byte offset of `</p:spTree>` in a slide part.
fn sp_tree_end(xml: &[u8]) -> Result<usize> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);
    loop {
        let pre = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf) {
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"spTree" {
                    return Ok(pre);
                }
            }
            Ok(Event::Eof) => {
                return Err(OoxmlError::InvalidFormat(
                    "part has no p:spTree".to_string(),
                ));
            }
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}
