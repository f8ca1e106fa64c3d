/// Run-level image scan over the main document story.
use std::ops::Range;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};

use super::document::decode_text;

/// Content type → asset file extension for embedded media.
static CONTENT_TYPE_EXTENSIONS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "image/png" => "png",
    "image/jpeg" => "jpg",
    "image/jpg" => "jpg",
    "image/gif" => "gif",
    "image/bmp" => "bmp",
    "image/tiff" => "tiff",
    "image/x-emf" => "emf",
    "image/x-wmf" => "wmf",
    "image/svg+xml" => "svg",
};

/// File extension → content type, the inverse direction used when
/// embedding asset files into a package.
static EXTENSION_CONTENT_TYPES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "png" => "image/png",
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "bmp" => "image/bmp",
    "tiff" => "image/tiff",
    "emf" => "image/x-emf",
    "wmf" => "image/x-wmf",
    "svg" => "image/svg+xml",
};

/// File extension for an image content type, `None` when unknown.
#[inline]
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    CONTENT_TYPE_EXTENSIONS.get(content_type).copied()
}

/// Content type for an image file extension, `None` when unknown.
#[inline]
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    EXTENSION_CONTENT_TYPES.get(extension).copied()
}

/// A `<w:r>` containing at least one embedded image reference.
#[derive(Debug, Clone)]
pub struct ImageRun {
    /// Byte range of the whole run element in `word/document.xml`.
    pub range: Range<usize>,
    /// `r:embed` relationship ids of every `<a:blip>` in the run, in
    /// document order.
    pub rel_ids: Vec<String>,
}

/// Scan the document part for runs that embed images.
///
/// Runs are matched at any depth so pictures inside table cells are
/// found. `<a:blip>` elements without an `r:embed` attribute (externally
/// linked pictures) are skipped.
pub fn image_runs(xml: &[u8]) -> Result<Vec<ImageRun>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);

    let mut runs = Vec::new();
    let mut open: Option<(usize, Vec<String>)> = None;

    loop {
        let pre = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let post = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) => {
                // w:r specifically; m:r math runs carry no drawings.
                if open.is_none() && e.name().as_ref() == b"w:r" {
                    open = Some((pre, Vec::new()));
                } else if let Some((_, ref mut rel_ids)) = open {
                    if e.local_name().as_ref() == b"blip" {
                        if let Some(id) = embed_attr(e) {
                            rel_ids.push(id);
                        }
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some((_, ref mut rel_ids)) = open {
                    if e.local_name().as_ref() == b"blip" {
                        if let Some(id) = embed_attr(e) {
                            rel_ids.push(id);
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"w:r" {
                    if let Some((start, rel_ids)) = open.take() {
                        if !rel_ids.is_empty() {
                            runs.push(ImageRun {
                                range: start..post,
                                rel_ids,
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
    Ok(runs)
}

fn embed_attr(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"embed" {
            return Some(decode_text(&attr.value));
        }
    }
    None
}
