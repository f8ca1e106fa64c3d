/// Open Packaging Conventions container access.
///
/// An OPC package is a ZIP archive whose entries ("parts") are addressed by
/// name, described by `[Content_Types].xml` and wired together through
/// `_rels/*.rels` relationship parts. This module loads a whole package
/// into memory, exposes part bytes for reading and replacement, parses the
/// content-type and relationship indexes, and writes the package back out.
///
/// Parts are kept as raw bytes in a sorted map; higher layers parse the
/// XML they care about and splice edits back in. This keeps untouched
/// parts byte-identical across a load/save round trip.
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::ooxml::error::{OoxmlError, Result};

/// Name of the content-types stream inside the archive.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// An OPC package held fully in memory.
///
/// Part names are ZIP entry names without a leading slash
/// (`word/document.xml`, `ppt/slides/slide1.xml`). `[Content_Types].xml`
/// is stored like any other entry and rewritten through the typed
/// [`ContentTypes`] accessor.
pub struct OpcPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl OpcPackage {
    /// Open a package from a file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Load a package from archive bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let mut blob = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut blob)?;
            parts.insert(entry.name().to_string(), blob);
        }
        Ok(Self { parts })
    }

    /// Get the bytes of a part.
    pub fn part(&self, name: &str) -> Result<&[u8]> {
        self.parts
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| OoxmlError::PartNotFound(name.to_string()))
    }

    /// Get the bytes of a part if it exists.
    #[inline]
    pub fn part_opt(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// Whether the package contains a part with this name.
    #[inline]
    pub fn has_part(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Replace or add a part.
    pub fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        self.parts.insert(name.to_string(), bytes);
    }

    /// Remove a part. Returns `true` if it was present.
    pub fn remove_part(&mut self, name: &str) -> bool {
        self.parts.remove(name).is_some()
    }

    /// Iterate over part names in sorted order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Number of parts in the package.
    #[inline]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Parse the content-type index.
    pub fn content_types(&self) -> Result<ContentTypes> {
        ContentTypes::parse(self.part(CONTENT_TYPES_PART)?)
    }

    /// Rewrite the content-type index.
    pub fn set_content_types(&mut self, types: &ContentTypes) {
        self.set_part(CONTENT_TYPES_PART, types.to_xml());
    }

    /// Parse the relationships of a part, or of the package root when
    /// `part_name` is empty. Returns an empty list when the rels part
    /// does not exist.
    pub fn relationships(&self, part_name: &str) -> Result<Vec<Relationship>> {
        let rels_name = rels_part_name(part_name);
        match self.part_opt(&rels_name) {
            Some(bytes) => parse_relationships(bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Rewrite the relationships of a part.
    pub fn set_relationships(&mut self, part_name: &str, rels: &[Relationship]) {
        let rels_name = rels_part_name(part_name);
        self.set_part(&rels_name, write_relationships(rels));
    }

    /// Serialize the package to archive bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        {
            let cursor = Cursor::new(&mut data);
            let mut writer = ZipWriter::new(cursor);
            let options = SimpleFileOptions::default();
            for (name, blob) in &self.parts {
                writer.start_file(name.as_str(), options)?;
                writer.write_all(blob)?;
            }
            writer.finish()?;
        }
        Ok(data)
    }

    /// Write the package to a file on disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// The parsed `[Content_Types].xml` index: extension defaults plus
/// per-part overrides. Override keys carry the leading slash the format
/// uses; [`ContentTypes::content_type_of`] accepts plain part names.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    pub defaults: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    /// Parse the content-types stream.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut types = Self::default();
        let mut buf = Vec::with_capacity(1024);
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    match e.local_name().as_ref() {
                        b"Default" => {
                            let mut extension = None;
                            let mut content_type = None;
                            for attr in e.attributes().flatten() {
                                match attr.key.local_name().as_ref() {
                                    b"Extension" => {
                                        extension = Some(attr_text(&attr.value));
                                    }
                                    b"ContentType" => {
                                        content_type = Some(attr_text(&attr.value));
                                    }
                                    _ => {}
                                }
                            }
                            if let (Some(ext), Some(ct)) = (extension, content_type) {
                                types.defaults.insert(ext.to_ascii_lowercase(), ct);
                            }
                        }
                        b"Override" => {
                            let mut part_name = None;
                            let mut content_type = None;
                            for attr in e.attributes().flatten() {
                                match attr.key.local_name().as_ref() {
                                    b"PartName" => {
                                        part_name = Some(attr_text(&attr.value));
                                    }
                                    b"ContentType" => {
                                        content_type = Some(attr_text(&attr.value));
                                    }
                                    _ => {}
                                }
                            }
                            if let (Some(name), Some(ct)) = (part_name, content_type) {
                                types.overrides.insert(name, ct);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(OoxmlError::Xml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }
        Ok(types)
    }

    /// Resolve the content type of a part name (no leading slash).
    /// Overrides win over extension defaults.
    pub fn content_type_of(&self, part_name: &str) -> Option<&str> {
        let keyed = format!("/{part_name}");
        if let Some(ct) = self.overrides.get(&keyed) {
            return Some(ct);
        }
        let extension = part_name.rsplit('.').next()?.to_ascii_lowercase();
        self.defaults.get(&extension).map(String::as_str)
    }

    /// Add or replace an override for a part name (no leading slash).
    pub fn set_override(&mut self, part_name: &str, content_type: &str) {
        self.overrides
            .insert(format!("/{part_name}"), content_type.to_string());
    }

    /// Remove the override for a part name (no leading slash).
    pub fn remove_override(&mut self, part_name: &str) {
        self.overrides.remove(&format!("/{part_name}"));
    }

    /// Ensure an extension default exists, adding one if missing.
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        self.defaults
            .entry(extension.to_ascii_lowercase())
            .or_insert_with(|| content_type.to_string());
    }

    /// Serialize back to the content-types stream.
    pub fn to_xml(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024);
        out.extend_from_slice(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        );
        out.extend_from_slice(
            br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        for (extension, content_type) in &self.defaults {
            out.extend_from_slice(b"<Default Extension=\"");
            push_escaped(&mut out, extension);
            out.extend_from_slice(b"\" ContentType=\"");
            push_escaped(&mut out, content_type);
            out.extend_from_slice(b"\"/>");
        }
        for (part_name, content_type) in &self.overrides {
            out.extend_from_slice(b"<Override PartName=\"");
            push_escaped(&mut out, part_name);
            out.extend_from_slice(b"\" ContentType=\"");
            push_escaped(&mut out, content_type);
            out.extend_from_slice(b"\"/>");
        }
        out.extend_from_slice(b"</Types>");
        out
    }
}

/// A single `<Relationship>` entry from a rels part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Parse a relationships part into its entries, in document order.
pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut rels = Vec::new();
    let mut buf = Vec::with_capacity(1024);
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut rel_type = None;
                    let mut target = None;
                    let mut external = false;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"Id" => id = Some(attr_text(&attr.value)),
                            b"Type" => rel_type = Some(attr_text(&attr.value)),
                            b"Target" => target = Some(attr_text(&attr.value)),
                            b"TargetMode" => {
                                external = attr.value.as_ref() == b"External";
                            }
                            _ => {}
                        }
                    }
                    match (id, rel_type, target) {
                        (Some(id), Some(rel_type), Some(target)) => {
                            rels.push(Relationship {
                                id,
                                rel_type,
                                target,
                                external,
                            });
                        }
                        _ => {
                            return Err(OoxmlError::InvalidRelationship(
                                "relationship missing Id, Type or Target".to_string(),
                            ));
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
    Ok(rels)
}

/// Serialize relationship entries back to a rels part.
pub fn write_relationships(rels: &[Relationship]) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + rels.len() * 128);
    out.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.extend_from_slice(
        br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for rel in rels {
        out.extend_from_slice(b"<Relationship Id=\"");
        push_escaped(&mut out, &rel.id);
        out.extend_from_slice(b"\" Type=\"");
        push_escaped(&mut out, &rel.rel_type);
        out.extend_from_slice(b"\" Target=\"");
        push_escaped(&mut out, &rel.target);
        out.extend_from_slice(b"\"");
        if rel.external {
            out.extend_from_slice(b" TargetMode=\"External\"");
        }
        out.extend_from_slice(b"/>");
    }
    out.extend_from_slice(b"</Relationships>");
    out
}

/// Compute the rels part name for a part, or for the package root when
/// the part name is empty (`""` → `_rels/.rels`).
pub fn rels_part_name(part_name: &str) -> String {
    if part_name.is_empty() {
        return "_rels/.rels".to_string();
    }
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against the part that declares it.
///
/// Targets are relative to the directory of the declaring part; `..`
/// segments step outward and a leading `/` makes the target absolute.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[inline]
fn attr_text(raw: &[u8]) -> String {
    quick_xml::escape::unescape(&String::from_utf8_lossy(raw))
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned())
}

fn push_escaped(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(quick_xml::escape::escape(text).as_bytes());
}
