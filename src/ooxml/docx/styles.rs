/// Styles part parsing.
use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ooxml::error::{OoxmlError, Result};

use super::document::decode_text;

/// Parse `word/styles.xml` into a styleId → display-name table.
///
/// Heading detection works on display names ("Heading 1", "Heading 2"),
/// which localized documents keep even when their style ids differ.
pub fn style_names(xml: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut names = BTreeMap::new();
    let mut current_style: Option<String> = None;
    let mut buf = Vec::with_capacity(1024);
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"style" => {
                        current_style = None;
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"styleId" {
                                current_style = Some(decode_text(&attr.value));
                            }
                        }
                    }
                    b"name" => {
                        if let Some(style_id) = current_style.as_ref() {
                            for attr in e.attributes().flatten() {
                                if attr.key.local_name().as_ref() == b"val" {
                                    names.insert(
                                        style_id.clone(),
                                        decode_text(&attr.value),
                                    );
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"style" {
                    current_style = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OoxmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}
