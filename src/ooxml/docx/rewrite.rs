/// Splice-based document rewrites.
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::OpcPackage;

/// Build a literal text run carrying `text` verbatim.
///
/// `xml:space="preserve"` keeps leading and trailing spaces so marker
/// sequences joined by single spaces survive a Word round trip.
pub fn marker_run(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + text.len());
    out.extend_from_slice(br#"<w:r><w:t xml:space="preserve">"#);
    out.extend_from_slice(quick_xml::escape::escape(text).as_bytes());
    out.extend_from_slice(b"</w:t></w:r>");
    out
}

/// Blank every `word/header*.xml` and `word/footer*.xml` part, keeping
/// each part's root element (with its namespace declarations) and
/// replacing the content with a single empty paragraph. Returns the
/// number of parts rewritten.
pub fn blank_headers_footers(pkg: &mut OpcPackage) -> Result<usize> {
    let targets: Vec<String> = pkg
        .part_names()
        .filter(|name| {
            let Some(file) = name.strip_prefix("word/") else {
                return false;
            };
            !file.contains('/')
                && (file.starts_with("header") || file.starts_with("footer"))
                && file.ends_with(".xml")
        })
        .map(str::to_string)
        .collect();

    for name in &targets {
        let xml = pkg.part(name)?;
        let blanked = blank_story(xml)?;
        pkg.set_part(name, blanked);
    }
    Ok(targets.len())
}

/// Rebuild a header/footer story as its original root element wrapping
/// one empty paragraph.
fn blank_story(xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);
    loop {
        let pre = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let post = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) => {
                let root_name = e.name().as_ref().to_vec();
                let mut out = Vec::with_capacity(post - pre + 64);
                out.extend_from_slice(
                    br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                );
                out.extend_from_slice(&xml[pre..post]);
                out.extend_from_slice(b"<w:p/>");
                out.extend_from_slice(b"</");
                out.extend_from_slice(&root_name);
                out.push(b'>');
                return Ok(out);
            }
            Ok(Event::Eof) => {
                return Err(OoxmlError::InvalidFormat(
                    "story part has no root element".to_string(),
                ));
            }
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}
