/// Shape-tree inventories for slide, layout and master parts.
use std::ops::Range;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};

use super::presentation::parse_i64;

/// A placeholder shape (`p:sp` carrying a `p:ph`).
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// `p:cNvPr` display name of the shape.
    pub name: String,
    /// `p:ph` `type` attribute (`title`, `body`, `pic`, ...).
    pub ph_type: Option<String>,
    /// `p:ph` `idx` attribute. Absent on title placeholders, which the
    /// format treats as idx 0.
    pub idx: Option<u32>,
    /// `a:off` of the shape's `a:xfrm`, in EMUs.
    pub offset: Option<(i64, i64)>,
    /// `a:ext` of the shape's `a:xfrm`, in EMUs.
    pub extent: Option<(i64, i64)>,
    /// Byte range of the whole `p:sp` element in the part.
    pub range: Range<usize>,
    /// Byte range of the shape's `p:txBody`, when present.
    pub txbody_range: Option<Range<usize>>,
}

impl Placeholder {
    /// Effective placeholder index: explicit `idx`, else 0 (title).
    #[inline]
    pub fn effective_idx(&self) -> u32 {
        self.idx.unwrap_or(0)
    }
}

/// How to select a placeholder within a shape tree.
#[derive(Debug, Clone)]
pub enum PlaceholderRef {
    /// Match on the effective placeholder index.
    Idx(u32),
    /// Match on the `p:ph` type attribute.
    Type(String),
    /// Match on the `p:cNvPr` shape name.
    Name(String),
}

/// Find a placeholder by reference.
pub fn find_placeholder<'a>(
    placeholders: &'a [Placeholder],
    by: &PlaceholderRef,
) -> Option<&'a Placeholder> {
    placeholders.iter().find(|ph| match by {
        PlaceholderRef::Idx(idx) => ph.effective_idx() == *idx,
        PlaceholderRef::Type(ph_type) => ph.ph_type.as_deref() == Some(ph_type.as_str()),
        PlaceholderRef::Name(name) => ph.name == *name,
    })
}

/// A `p:pic` shape.
#[derive(Debug, Clone)]
pub struct Picture {
    /// `r:embed` of the picture's `a:blip`, when present.
    pub rel_id: Option<String>,
    /// `a:ext` of the picture's `a:xfrm`, in EMUs.
    pub extent: Option<(i64, i64)>,
    /// Byte range of the whole `p:pic` element in the part.
    pub range: Range<usize>,
}

impl Picture {
    /// Pixel area proxy used to pick the dominant picture of a slide.
    #[inline]
    pub fn area(&self) -> i64 {
        match self.extent {
            Some((cx, cy)) => cx.saturating_mul(cy),
            None => 0,
        }
    }
}

/// The `p:cSld` display name of a slide or layout part.
pub fn slide_name(xml: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"cSld" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"name" {
                            return Ok(Some(
                                String::from_utf8_lossy(&attr.value).into_owned(),
                            ));
                        }
                    }
                    return Ok(None);
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

/// Inventory the placeholder shapes of a part, in shape-tree order.
pub fn placeholders(xml: &[u8]) -> Result<Vec<Placeholder>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);

    let mut result = Vec::new();
    let mut open: Option<OpenShape> = None;
    let mut sp_depth = 0usize;

    loop {
        let pre = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let post = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) => {
                if open.is_none() && e.local_name().as_ref() == b"sp" {
                    open = Some(OpenShape::new(pre));
                    sp_depth = 1;
                } else if let Some(ref mut shape) = open {
                    sp_depth += 1;
                    match e.local_name().as_ref() {
                        b"txBody" => shape.txbody_start = Some(pre),
                        b"cNvPr" => shape.read_cnvpr(e),
                        b"ph" => shape.read_ph(e),
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(ref mut shape) = open {
                    match e.local_name().as_ref() {
                        b"cNvPr" => shape.read_cnvpr(e),
                        b"ph" => shape.read_ph(e),
                        b"off" => shape.read_point(e, true),
                        b"ext" => shape.read_point(e, false),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if open.is_some() {
                    if e.local_name().as_ref() == b"txBody" {
                        if let Some(ref mut shape) = open {
                            if let Some(start) = shape.txbody_start.take() {
                                shape.txbody_range = Some(start..post);
                            }
                        }
                    }
                    sp_depth -= 1;
                    if e.local_name().as_ref() == b"sp" && sp_depth == 0 {
                        if let Some(shape) = open.take() {
                            if let Some(placeholder) = shape.finish(post) {
                                result.push(placeholder);
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
    Ok(result)
}

/// Inventory the `p:pic` shapes of a part, in shape-tree order.
pub fn pictures(xml: &[u8]) -> Result<Vec<Picture>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);

    let mut result = Vec::new();
    let mut open: Option<(usize, Option<String>, Option<(i64, i64)>)> = None;
    let mut pic_depth = 0usize;

    loop {
        let pre = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let post = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) => {
                if open.is_none() && e.local_name().as_ref() == b"pic" {
                    open = Some((pre, None, None));
                    pic_depth = 1;
                } else if let Some((_, ref mut rel_id, _)) = open {
                    pic_depth += 1;
                    if e.local_name().as_ref() == b"blip" && rel_id.is_none() {
                        *rel_id = embed_attr(e);
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some((_, ref mut rel_id, ref mut extent)) = open {
                    match e.local_name().as_ref() {
                        b"blip" => {
                            if rel_id.is_none() {
                                *rel_id = embed_attr(e);
                            }
                        }
                        b"ext" => {
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
                                *extent = Some((cx, cy));
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if open.is_some() {
                    pic_depth -= 1;
                    if e.local_name().as_ref() == b"pic" && pic_depth == 0 {
                        if let Some((start, rel_id, extent)) = open.take() {
                            result.push(Picture {
                                rel_id,
                                extent,
                                range: start..post,
                            });
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
    Ok(result)
}

struct OpenShape {
    start: usize,
    name: Option<String>,
    ph_type: Option<String>,
    idx: Option<u32>,
    has_ph: bool,
    offset: Option<(i64, i64)>,
    extent: Option<(i64, i64)>,
    txbody_start: Option<usize>,
    txbody_range: Option<Range<usize>>,
}

impl OpenShape {
    fn new(start: usize) -> Self {
        Self {
            start,
            name: None,
            ph_type: None,
            idx: None,
            has_ph: false,
            offset: None,
            extent: None,
            txbody_start: None,
            txbody_range: None,
        }
    }

    fn read_cnvpr(&mut self, e: &quick_xml::events::BytesStart<'_>) {
        if self.name.is_some() {
            return;
        }
        for attr in e.attributes().flatten() {
            if attr.key.local_name().as_ref() == b"name" {
                self.name = Some(String::from_utf8_lossy(&attr.value).into_owned());
            }
        }
    }

    fn read_ph(&mut self, e: &quick_xml::events::BytesStart<'_>) {
        self.has_ph = true;
        for attr in e.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"type" => {
                    self.ph_type = Some(String::from_utf8_lossy(&attr.value).into_owned());
                }
                b"idx" => {
                    self.idx = String::from_utf8_lossy(&attr.value).parse::<u32>().ok();
                }
                _ => {}
            }
        }
    }

    fn read_point(&mut self, e: &quick_xml::events::BytesStart<'_>, is_offset: bool) {
        let mut first = None;
        let mut second = None;
        for attr in e.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"x" | b"cx" => first = parse_i64(&attr.value),
                b"y" | b"cy" => second = parse_i64(&attr.value),
                _ => {}
            }
        }
        if let (Some(a), Some(b)) = (first, second) {
            if is_offset {
                self.offset.get_or_insert((a, b));
            } else {
                self.extent.get_or_insert((a, b));
            }
        }
    }

    fn finish(self, end: usize) -> Option<Placeholder> {
        if !self.has_ph {
            return None;
        }
        Some(Placeholder {
            name: self.name.unwrap_or_default(),
            ph_type: self.ph_type,
            idx: self.idx,
            offset: self.offset,
            extent: self.extent,
            range: self.start..end,
            txbody_range: self.txbody_range,
        })
    }
}

fn embed_attr(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"embed" {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(shapes: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0"?><p:sldLayout xmlns:p="http://p" xmlns:a="http://a" xmlns:r="http://r"><p:cSld name="TITULO"><p:spTree>{shapes}</p:spTree></p:cSld></p:sldLayout>"#
        )
        .into_bytes()
    }

    fn placeholder_sp(name: &str, ph: &str, xfrm: &str) -> String {
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="{name}"/><p:cNvSpPr/><p:nvPr>{ph}</p:nvPr></p:nvSpPr><p:spPr>{xfrm}</p:spPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>x</a:t></a:r></a:p></p:txBody></p:sp>"#
        )
    }

    #[test]
    fn test_placeholder_inventory() {
        let xml = layout(&format!(
            "{}{}",
            placeholder_sp(
                "title",
                r#"<p:ph type="title"/>"#,
                r#"<a:xfrm><a:off x="100" y="200"/><a:ext cx="300" cy="400"/></a:xfrm>"#,
            ),
            placeholder_sp("bullets", r#"<p:ph type="body" idx="1"/>"#, ""),
        ));
        let phs = placeholders(&xml).unwrap();
        assert_eq!(phs.len(), 2);
        assert_eq!(phs[0].name, "title");
        assert_eq!(phs[0].ph_type.as_deref(), Some("title"));
        assert_eq!(phs[0].effective_idx(), 0);
        assert_eq!(phs[0].offset, Some((100, 200)));
        assert_eq!(phs[0].extent, Some((300, 400)));
        assert!(phs[0].txbody_range.is_some());
        assert_eq!(phs[1].effective_idx(), 1);
    }

    #[test]
    fn test_non_placeholder_shapes_excluded() {
        let xml = layout(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="5" name="decoration"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/></p:sp>"#,
        );
        assert!(placeholders(&xml).unwrap().is_empty());
    }

    #[test]
    fn test_find_placeholder_by_each_key() {
        let xml = layout(&placeholder_sp("pip", r#"<p:ph type="body" idx="10"/>"#, ""));
        let phs = placeholders(&xml).unwrap();
        assert!(find_placeholder(&phs, &PlaceholderRef::Idx(10)).is_some());
        assert!(find_placeholder(&phs, &PlaceholderRef::Type("body".to_string())).is_some());
        assert!(find_placeholder(&phs, &PlaceholderRef::Name("pip".to_string())).is_some());
        assert!(find_placeholder(&phs, &PlaceholderRef::Idx(11)).is_none());
    }

    #[test]
    fn test_slide_name() {
        let xml = layout("");
        assert_eq!(slide_name(&xml).unwrap().as_deref(), Some("TITULO"));
        let unnamed = br#"<p:sld xmlns:p="http://p"><p:cSld><p:spTree/></p:cSld></p:sld>"#;
        assert_eq!(slide_name(unnamed).unwrap(), None);
    }

    #[test]
    fn test_pictures_inventory() {
        let xml = layout(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="7" name="img"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId4"/></p:blipFill><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="100" cy="50"/></a:xfrm></p:spPr></p:pic>"#,
        );
        let pics = pictures(&xml).unwrap();
        assert_eq!(pics.len(), 1);
        assert_eq!(pics[0].rel_id.as_deref(), Some("rId4"));
        assert_eq!(pics[0].area(), 5000);
    }
}
